//! SPSDK signing toolkit installed in the workspace virtual environment

use crate::core::{
    config::SigningSettings,
    registry::{NXPCRYPTO, NXPIMAGE},
    Workspace,
};
use crate::provider::{
    command::ToolCommand, ExportRequest, ImageMetadata, KeyPair, PackagingKind, ProviderError,
    SigningProvider, SrkDigest,
};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Production signing provider backed by `nxpimage` and `nxpcrypto`
#[derive(Debug, Clone)]
pub struct SpsdkSigningProvider {
    python: String,
    package: String,
    venv: PathBuf,
    family: String,
    revision: String,
    timeout_secs: u64,
}

impl SpsdkSigningProvider {
    pub fn new(settings: &SigningSettings, workspace: &Workspace, timeout_secs: u64) -> Self {
        Self {
            python: settings.python.clone(),
            package: settings.package.clone(),
            venv: workspace.venv(),
            family: settings.family.clone(),
            revision: settings.revision.clone(),
            timeout_secs,
        }
    }

    fn venv_tool(&self, name: &str) -> PathBuf {
        self.venv.join("bin").join(name)
    }

    fn tool(&self, name: &str) -> ToolCommand {
        ToolCommand::new(self.venv_tool(name).to_string_lossy().into_owned())
            .timeout_secs(self.timeout_secs)
    }

    fn family_args(&self) -> [&str; 4] {
        ["-f", self.family.as_str(), "-r", self.revision.as_str()]
    }
}

/// Extract the SRK hash printed by `nxpimage`
pub fn parse_srk_hash(output: &str) -> Result<SrkDigest, ProviderError> {
    let unexpected = |message: String| ProviderError::UnexpectedOutput {
        tool: NXPIMAGE.to_string(),
        message,
    };

    let regex = Regex::new(r"(?i)(?:\b0x|\b)([0-9a-f]{64})\b")
        .map_err(|e| unexpected(format!("invalid hash pattern: {}", e)))?;

    regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| SrkDigest::from_hex(m.as_str()))
        .ok_or_else(|| unexpected("no SRK hash in output".to_string()))
}

#[async_trait]
impl SigningProvider for SpsdkSigningProvider {
    async fn prepare_environment(&self, workspace: &Workspace) -> Result<(), ProviderError> {
        let venv = workspace.venv();
        let python = workspace.venv_bin("python");

        if !python.exists() {
            info!("Creating virtual environment at {}", venv.display());
            ToolCommand::new(self.python.clone())
                .args(["-m", "venv"])
                .arg(&venv)
                .timeout_secs(self.timeout_secs)
                .output()
                .await?;
        }

        if workspace.venv_bin(NXPIMAGE).exists() && workspace.venv_bin(NXPCRYPTO).exists() {
            debug!("{} already installed", self.package);
            return Ok(());
        }

        info!("Installing {}", self.package);
        ToolCommand::new(python.to_string_lossy().into_owned())
            .args(["-m", "pip", "install", "--upgrade", self.package.as_str()])
            .timeout_secs(self.timeout_secs)
            .output()
            .await?;
        Ok(())
    }

    async fn generate_key_pair(
        &self,
        curve: &str,
        private: &Path,
        public: &Path,
    ) -> Result<KeyPair, ProviderError> {
        debug!("Generating {} key {}", curve, private.display());
        self.tool(NXPCRYPTO)
            .args(["key", "generate", "-k", curve, "-o"])
            .arg(private)
            .arg("--force")
            .output()
            .await?;

        self.tool(NXPCRYPTO)
            .args(["key", "convert", "-e", "PEM", "--puk", "-i"])
            .arg(private)
            .arg("-o")
            .arg(public)
            .output()
            .await?;

        Ok(KeyPair {
            private: private.to_path_buf(),
            public: public.to_path_buf(),
        })
    }

    async fn verify_key_pair(&self, private: &Path, public: &Path) -> Result<bool, ProviderError> {
        let result = self
            .tool(NXPCRYPTO)
            .args(["key", "verify", "-k1"])
            .arg(private)
            .arg("-k2")
            .arg(public)
            .output()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(ProviderError::ExitStatus { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn srk_table(&self, public_keys: &[PathBuf], table: &Path) -> Result<SrkDigest, ProviderError> {
        let mut command = self
            .tool(NXPIMAGE)
            .args(["ahab", "srk-table"])
            .args(self.family_args());
        for key in public_keys {
            command = command.arg("-k").arg(key);
        }
        let output = command.arg("-o").arg(table).output().await?;

        let digest = parse_srk_hash(&output.stdout)?;
        debug!("SRK hash {}", digest.to_hex());
        Ok(digest)
    }

    async fn export_image(&self, request: &ExportRequest) -> Result<PathBuf, ProviderError> {
        let command = match request.kind {
            PackagingKind::Container => self
                .tool(NXPIMAGE)
                .args(["ahab", "export", "-c"])
                .arg(&request.config),
            PackagingKind::BootableImage => self
                .tool(NXPIMAGE)
                .args(["bootable-image", "merge", "-c"])
                .arg(&request.config)
                .arg("-o")
                .arg(&request.output),
        };
        info!("Exporting {}", request.output.display());
        command.output().await?;

        if !request.output.exists() {
            return Err(ProviderError::UnexpectedOutput {
                tool: NXPIMAGE.to_string(),
                message: format!("{} was not created", request.output.display()),
            });
        }
        Ok(request.output.clone())
    }

    async fn verify_image(&self, image: &Path, metadata: &ImageMetadata) -> Result<(), ProviderError> {
        info!("Verifying {} for {}", image.display(), metadata.media);
        self.tool(NXPIMAGE)
            .args(["bootable-image", "verify"])
            .args(["-f", metadata.family.as_str(), "-r", metadata.revision.as_str()])
            .args(["-m", metadata.media.as_str(), "-b"])
            .arg(image)
            .output()
            .await?;
        Ok(())
    }
}
