//! Dependency checks run right before a step's action

use crate::core::Dependency;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// The first dependency found missing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing dependency {0}")]
pub struct MissingDependency(pub Dependency);

/// Answers whether host tools are available
#[async_trait]
pub trait ToolProbe: Send + Sync {
    fn has_executable(&self, name: &str) -> bool;

    async fn can_import(&self, interpreter: &str, module: &str) -> bool;
}

/// Probes the real host: `PATH` lookup and interpreter imports
#[derive(Debug, Clone, Default)]
pub struct HostProbe {
    search_path: Option<Vec<PathBuf>>,
}

impl HostProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search these directories instead of `PATH`
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path: Some(search_path),
        }
    }

    fn directories(&self) -> Vec<PathBuf> {
        match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl ToolProbe for HostProbe {
    fn has_executable(&self, name: &str) -> bool {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 || candidate.is_absolute() {
            return is_executable(candidate);
        }
        self.directories()
            .iter()
            .any(|dir| is_executable(&dir.join(name)))
    }

    async fn can_import(&self, interpreter: &str, module: &str) -> bool {
        if !self.has_executable(interpreter) {
            return false;
        }
        Command::new(interpreter)
            .arg("-c")
            .arg(format!("import {}", module))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Verifies a step's required tools before it runs
#[derive(Clone)]
pub struct DependencyChecker {
    probe: Arc<dyn ToolProbe>,
}

impl DependencyChecker {
    pub fn new(probe: Arc<dyn ToolProbe>) -> Self {
        Self { probe }
    }

    pub fn host() -> Self {
        Self::new(Arc::new(HostProbe::new()))
    }

    /// Fails on the first missing dependency, in declaration order
    pub async fn check_required(&self, dependencies: &[Dependency]) -> Result<(), MissingDependency> {
        for dependency in dependencies {
            let present = match dependency {
                Dependency::Executable { name } => self.probe.has_executable(name),
                Dependency::Module {
                    interpreter,
                    module,
                } => self.probe.can_import(interpreter, module).await,
            };
            if !present {
                debug!("Missing {}", dependency);
                return Err(MissingDependency(dependency.clone()));
            }
        }
        Ok(())
    }
}
