//! Workspace directory management
//!
//! The workspace is the only durable state of a run. Its root is resolved to
//! an absolute path once; every other path is derived from it.

use crate::core::step::ArtifactBase;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const INPUTS_DIR: &str = "inputs";
pub const OUTPUTS_DIR: &str = "outputs";
pub const KEYS_DIR: &str = "keys";
pub const VENV_DIR: &str = "venv";

/// Absolute workspace root with its fixed subdirectories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Resolve `root` and create `inputs/`, `outputs/` and `keys/` if absent
    pub fn ensure(root: impl AsRef<Path>) -> io::Result<Self> {
        let workspace = Self::locate(root)?;
        for dir in [INPUTS_DIR, OUTPUTS_DIR, KEYS_DIR] {
            std::fs::create_dir_all(workspace.root.join(dir))?;
        }
        debug!("Workspace ready at {}", workspace.root.display());
        Ok(workspace)
    }

    /// Resolve `root` without touching the filesystem
    pub fn locate(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: absolutize(root.as_ref())?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inputs(&self) -> PathBuf {
        self.root.join(INPUTS_DIR)
    }

    pub fn outputs(&self) -> PathBuf {
        self.root.join(OUTPUTS_DIR)
    }

    pub fn keys(&self) -> PathBuf {
        self.root.join(KEYS_DIR)
    }

    /// Python virtual environment used by the signing toolkit
    pub fn venv(&self) -> PathBuf {
        self.root.join(VENV_DIR)
    }

    /// Path of an executable installed in the workspace venv
    pub fn venv_bin(&self, name: &str) -> PathBuf {
        self.venv().join("bin").join(name)
    }

    /// Create (if needed) and return a directory below the root
    pub fn subdir(&self, relative: impl AsRef<Path>) -> io::Result<PathBuf> {
        let dir = self.root.join(relative);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Absolute path of `relative` under the given base directory
    pub fn resolve(&self, base: ArtifactBase, relative: &str) -> PathBuf {
        let dir = match base {
            ArtifactBase::Root => self.root.clone(),
            ArtifactBase::Inputs => self.inputs(),
            ArtifactBase::Outputs => self.outputs(),
            ArtifactBase::Keys => self.keys(),
        };
        dir.join(relative)
    }
}

/// Expand `~` and anchor relative paths at the current directory
fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))?
            .join(rest),
        Err(_) => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}
