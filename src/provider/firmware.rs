//! Vendor firmware: HTTP download and self-extracting archives

use crate::core::config::file_name;
use crate::provider::{command::ToolCommand, FirmwareProvider, ProviderError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Downloads archives with `reqwest` and runs them with `sh`
#[derive(Debug, Clone)]
pub struct HttpFirmwareProvider {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFirmwareProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            timeout_secs,
        }
    }

    async fn fetch(&self, url: &str, partial: &Path) -> Result<u64, ProviderError> {
        let download_error = |e: reqwest::Error| ProviderError::Download {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_error)?;

        let mut file = tokio::fs::File::create(partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Directory a self-extracting archive unpacks into
pub fn extraction_dir(archive: &Path) -> PathBuf {
    archive.with_extension("")
}

#[async_trait]
impl FirmwareProvider for HttpFirmwareProvider {
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ProviderError> {
        let name = file_name(url);
        if name.is_empty() {
            return Err(ProviderError::Download {
                url: url.to_string(),
                message: "URL has no file name".to_string(),
            });
        }

        let target = dir.join(&name);
        if target.exists() {
            debug!("{} already downloaded", target.display());
            return Ok(target);
        }

        tokio::fs::create_dir_all(dir).await?;
        let partial = dir.join(format!("{}.part", name));
        info!("Downloading {}", url);

        match self.fetch(url, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &target).await?;
                debug!("Downloaded {} bytes to {}", bytes, target.display());
                Ok(target)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn self_extract(&self, archive: &Path, accept_eula: bool) -> Result<PathBuf, ProviderError> {
        if !accept_eula {
            return Err(ProviderError::LicenseNotAccepted {
                archive: archive.to_path_buf(),
            });
        }

        let dir = extraction_dir(archive);
        if dir.is_dir() {
            debug!("{} already extracted", archive.display());
            return Ok(dir);
        }

        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        info!("Extracting {}", archive.display());
        ToolCommand::new("sh")
            .arg(archive)
            .arg("--auto-accept")
            .current_dir(parent)
            .timeout_secs(self.timeout_secs)
            .output()
            .await?;

        if !dir.is_dir() {
            return Err(ProviderError::UnexpectedOutput {
                tool: "sh".to_string(),
                message: format!(
                    "{} did not unpack into {}",
                    archive.display(),
                    dir.display()
                ),
            });
        }
        Ok(dir)
    }
}
