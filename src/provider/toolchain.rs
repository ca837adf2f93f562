//! Source checkout and cross-compilation with `git` and `make`

use crate::core::config::RepoRef;
use crate::provider::{command::ToolCommand, BuildTarget, ProviderError, ToolchainProvider};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Production toolchain: shallow `git clone` and `make`
#[derive(Debug, Clone)]
pub struct GitMakeToolchain {
    timeout_secs: u64,
    jobs: usize,
}

impl GitMakeToolchain {
    pub fn new(timeout_secs: u64) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { timeout_secs, jobs }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    fn make(&self, source: &Path) -> ToolCommand {
        ToolCommand::new("make")
            .current_dir(source)
            .timeout_secs(self.timeout_secs)
    }

    /// Arguments of the main `make` invocation
    fn build_args(&self, target: &BuildTarget) -> Vec<String> {
        let mut args = vec![
            format!("-j{}", self.jobs),
            format!("CROSS_COMPILE={}", target.cross_compile),
        ];
        args.extend(target.make_args.iter().cloned());
        args
    }
}

#[async_trait]
impl ToolchainProvider for GitMakeToolchain {
    async fn clone_repo(&self, repo: &RepoRef, dest: &Path) -> Result<PathBuf, ProviderError> {
        if dest.join(".git").exists() {
            debug!("{} already checked out at {}", repo.url, dest.display());
            return Ok(dest.to_path_buf());
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Cloning {} ({})", repo.url, repo.branch);
        ToolCommand::new("git")
            .args(["clone", "--depth", "1", "--branch", repo.branch.as_str(), repo.url.as_str()])
            .arg(dest)
            .timeout_secs(self.timeout_secs)
            .output()
            .await?;
        Ok(dest.to_path_buf())
    }

    async fn build(&self, source: &Path, target: &BuildTarget) -> Result<Vec<PathBuf>, ProviderError> {
        let as_build_error = |e: ProviderError| match e {
            ProviderError::ExitStatus { tool, code, stderr } => ProviderError::Build {
                target: target.name.clone(),
                message: format!("`{}` exited with code {}: {}", tool, code, stderr),
            },
            other => other,
        };

        if let Some(defconfig) = &target.defconfig {
            info!("Configuring {} with {}", target.name, defconfig);
            self.make(source)
                .arg(defconfig)
                .arg(format!("CROSS_COMPILE={}", target.cross_compile))
                .output()
                .await
                .map_err(as_build_error)?;
        }

        info!("Building {}", target.name);
        self.make(source)
            .args(self.build_args(target))
            .output()
            .await
            .map_err(as_build_error)?;

        let outputs: Vec<PathBuf> = target.outputs.iter().map(|o| source.join(o)).collect();
        let missing: Vec<String> = outputs
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ProviderError::Build {
                target: target.name.clone(),
                message: format!("build produced no {}", missing.join(", ")),
            });
        }
        Ok(outputs)
    }
}
