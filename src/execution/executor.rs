//! Step executor - performs the action of a single step through the providers

use crate::{
    core::{
        config::{file_name, FirmwareArchive, RepoRef},
        packaging::ImageConfigSet,
        registry::{
            srk_key_names, BL31_BIN, SRK_FUSES_TXT, SRK_HASH_TXT, SRK_TABLE_BIN,
            SPL_CONTAINER_BIN, UBOOT_BIN, UBOOT_CONTAINER_BIN, UBOOT_SPL_BIN,
        },
        PipelineConfig, PipelineError, Step, StepAction, StepId, ToolSettings, Workspace,
    },
    provider::{
        firmware::extraction_dir, BuildTarget, ExportRequest, ImageMetadata, PackagingKind,
        ProviderError, Providers, SrkDigest,
    },
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Checkouts live under `<workspace>/src`
pub const SOURCES_DIR: &str = "src";
/// Firmware archives are downloaded to `<workspace>/downloads`
pub const DOWNLOADS_DIR: &str = "downloads";

/// Everything an action reads
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a PipelineConfig,
    pub workspace: &'a Workspace,
    pub tools: &'a ToolSettings,
}

/// Executes step actions
pub struct StepExecutor {
    providers: Providers,
}

impl StepExecutor {
    pub fn new(providers: Providers) -> Self {
        Self { providers }
    }

    /// Run the action of `step`; outputs are checked by the caller
    pub async fn execute(&self, step: &Step, ctx: StepContext<'_>) -> Result<(), PipelineError> {
        info!("Executing step {}: {}", step.id, step.name);
        let result = match step.action {
            StepAction::BuildBootloader => self.build_bootloader(ctx).await,
            StepAction::BuildTrustedFirmware => self.build_trusted_firmware(ctx).await,
            StepAction::FetchFirmware => self.fetch_firmware(ctx).await,
            StepAction::PrepareSigningEnv => self
                .providers
                .signing
                .prepare_environment(ctx.workspace)
                .await
                .map_err(ActionError::Provider),
            StepAction::GenerateKeys => self.generate_keys(ctx).await,
            StepAction::WriteImageConfigs => write_image_configs(ctx),
            StepAction::ExportImage => self.export_image(ctx).await,
        };
        result.map_err(|e| e.for_step(step))
    }

    async fn checkout(&self, repo: &RepoRef, ws: &Workspace) -> Result<PathBuf, ActionError> {
        let sources = ws.subdir(SOURCES_DIR).map_err(ActionError::io(ws.root()))?;
        let dest = sources.join(repo_dir_name(&repo.url));
        if dest.join(".git").exists() {
            debug!("Reusing checkout {}", dest.display());
            return Ok(dest);
        }
        Ok(self.providers.toolchain.clone_repo(repo, &dest).await?)
    }

    async fn build_bootloader(&self, ctx: StepContext<'_>) -> Result<(), ActionError> {
        let source = self.checkout(&ctx.tools.uboot, ctx.workspace).await?;
        let target = BuildTarget {
            name: "u-boot".to_string(),
            defconfig: Some(ctx.config.board.uboot_defconfig().to_string()),
            make_args: vec![],
            cross_compile: ctx.tools.cross_compile.clone(),
            outputs: vec![PathBuf::from(UBOOT_BIN), Path::new("spl").join(UBOOT_SPL_BIN)],
        };
        let built = self.providers.toolchain.build(&source, &target).await?;
        stage_inputs(ctx.workspace, &built, &[UBOOT_BIN, UBOOT_SPL_BIN]).await
    }

    async fn build_trusted_firmware(&self, ctx: StepContext<'_>) -> Result<(), ActionError> {
        let source = self.checkout(&ctx.tools.atf, ctx.workspace).await?;
        let target = BuildTarget {
            name: "bl31".to_string(),
            defconfig: None,
            make_args: vec!["PLAT=imx93".to_string(), "bl31".to_string()],
            cross_compile: ctx.tools.cross_compile.clone(),
            outputs: vec![Path::new("build/imx93/release").join(BL31_BIN)],
        };
        let built = self.providers.toolchain.build(&source, &target).await?;
        stage_inputs(ctx.workspace, &built, &[BL31_BIN]).await
    }

    async fn fetch_firmware(&self, ctx: StepContext<'_>) -> Result<(), ActionError> {
        let ws = ctx.workspace;
        for archive in &ctx.tools.firmware.archives {
            if archive_staged(archive, ws) {
                debug!("Firmware from {} already in place", archive.url);
                continue;
            }

            let downloads = ws.subdir(DOWNLOADS_DIR).map_err(ActionError::io(ws.root()))?;
            let path = self.providers.firmware.download(&archive.url, &downloads).await?;
            let extracted = self
                .providers
                .firmware
                .self_extract(&path, ctx.tools.firmware.accept_eula)
                .await?;

            for file in &archive.files {
                let source = extracted.join(file);
                if !source.exists() {
                    return Err(ActionError::Provider(ProviderError::UnexpectedOutput {
                        tool: "sh".to_string(),
                        message: format!(
                            "{} does not contain {}",
                            extraction_dir(&path).display(),
                            file
                        ),
                    }));
                }
                copy(&source, &ws.inputs().join(file_name(file))).await?;
            }
        }
        Ok(())
    }

    async fn generate_keys(&self, ctx: StepContext<'_>) -> Result<(), ActionError> {
        let signing = &self.providers.signing;
        let keys_dir = ctx.workspace.keys();
        let mut public_keys = Vec::new();

        for index in 0..ctx.tools.signing.srk_count {
            let (private_name, public_name) = srk_key_names(index);
            let private = keys_dir.join(private_name);
            let public = keys_dir.join(public_name);

            let reusable = private.exists()
                && public.exists()
                && signing.verify_key_pair(&private, &public).await?;
            if reusable {
                debug!("Reusing SRK {}", index);
            } else {
                signing
                    .generate_key_pair(&ctx.tools.signing.curve, &private, &public)
                    .await?;
            }
            public_keys.push(public);
        }

        let digest = signing
            .srk_table(&public_keys, &keys_dir.join(SRK_TABLE_BIN))
            .await?;
        write_file(&keys_dir.join(SRK_HASH_TXT), format!("{}\n", digest.to_hex())).await?;
        write_file(&keys_dir.join(SRK_FUSES_TXT), fuse_commands(&digest)).await?;
        info!("SRK hash {}", digest.to_hex());
        Ok(())
    }

    async fn export_image(&self, ctx: StepContext<'_>) -> Result<(), ActionError> {
        let ws = ctx.workspace;
        let [spl_config, uboot_config, bootable_config] = ImageConfigSet::paths(ws);
        let requests = [
            ExportRequest {
                kind: PackagingKind::Container,
                config: spl_config,
                output: ws.outputs().join(SPL_CONTAINER_BIN),
            },
            ExportRequest {
                kind: PackagingKind::Container,
                config: uboot_config,
                output: ws.outputs().join(UBOOT_CONTAINER_BIN),
            },
            ExportRequest {
                kind: PackagingKind::BootableImage,
                config: bootable_config,
                output: ImageConfigSet::image_path(ws),
            },
        ];

        let [spl, uboot, bootable] = requests;
        self.providers.signing.export_image(&spl).await?;
        self.providers.signing.export_image(&uboot).await?;
        let image = self.providers.signing.export_image(&bootable).await?;

        let metadata = ImageMetadata {
            family: ctx.tools.signing.family.clone(),
            revision: ctx.tools.signing.revision.clone(),
            media: ctx.config.boot_media,
        };
        self.providers.signing.verify_image(&image, &metadata).await?;
        info!("Bootable image ready: {}", image.display());
        Ok(())
    }
}

/// Packaging documents the export step reads that no longer match `ctx`
pub fn stale_requirements(step: &Step, ctx: StepContext<'_>) -> Option<(StepId, Vec<PathBuf>)> {
    if step.action != StepAction::ExportImage {
        return None;
    }
    let stale = ImageConfigSet::standard(ctx.config, ctx.tools, ctx.workspace)
        .stale_documents(ctx.workspace);
    let first = stale.first()?;
    let producer = step
        .requires
        .iter()
        .find(|r| r.artifact.resolve(ctx.workspace) == *first)?
        .producer;
    Some((producer, stale))
}

fn write_image_configs(ctx: StepContext<'_>) -> Result<(), ActionError> {
    let set = ImageConfigSet::standard(ctx.config, ctx.tools, ctx.workspace);
    let written = set
        .write(ctx.workspace)
        .map_err(ActionError::io(&ctx.workspace.outputs()))?;
    for path in written {
        debug!("Wrote {}", path.display());
    }
    Ok(())
}

/// U-Boot commands that burn the SRK hash into the OTP fuse bank
pub fn fuse_commands(digest: &SrkDigest) -> String {
    digest
        .fuse_words()
        .iter()
        .enumerate()
        .map(|(word, value)| format!("fuse prog -y 16 {} 0x{:08x}\n", word, value))
        .collect()
}

/// Directory name of a checkout, e.g. `uboot-imx` for `.../uboot-imx.git`
fn repo_dir_name(url: &str) -> String {
    let name = file_name(url.trim_end_matches('/'));
    name.strip_suffix(".git").unwrap_or(&name).to_string()
}

fn archive_staged(archive: &FirmwareArchive, ws: &Workspace) -> bool {
    archive
        .files
        .iter()
        .all(|f| ws.inputs().join(file_name(f)).exists())
}

/// Copy build products into `inputs/` under the given names
async fn stage_inputs(ws: &Workspace, built: &[PathBuf], names: &[&str]) -> Result<(), ActionError> {
    for (source, name) in built.iter().zip(names) {
        copy(source, &ws.inputs().join(name)).await?;
    }
    Ok(())
}

async fn copy(from: &Path, to: &Path) -> Result<(), ActionError> {
    tokio::fs::copy(from, to)
        .await
        .map_err(ActionError::io(to))?;
    debug!("Staged {} -> {}", from.display(), to.display());
    Ok(())
}

async fn write_file(path: &Path, contents: String) -> Result<(), ActionError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(ActionError::io(path))
}

/// Failure inside an action before it is attributed to a step
#[derive(Debug)]
enum ActionError {
    Provider(ProviderError),
    Workspace(PathBuf, std::io::Error),
}

impl ActionError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ActionError + '_ {
        move |e| ActionError::Workspace(path.to_path_buf(), e)
    }

    fn for_step(self, step: &Step) -> PipelineError {
        match self {
            ActionError::Provider(source) => PipelineError::ExternalTool {
                step: step.id,
                step_name: step.name.to_string(),
                source,
            },
            ActionError::Workspace(path, source) => PipelineError::Workspace { path, source },
        }
    }
}

impl From<ProviderError> for ActionError {
    fn from(e: ProviderError) -> Self {
        ActionError::Provider(e)
    }
}
