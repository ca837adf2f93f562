//! Errors reported by external collaborators

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to start `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` exited with code {code}: {stderr}")]
    ExitStatus {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("`{tool}` timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("build of {target} failed: {message}")]
    Build { target: String, message: String },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("license of {} not accepted; set tools.firmware.accept_eula to extract it", archive.display())]
    LicenseNotAccepted { archive: PathBuf },

    #[error("unexpected result from `{tool}`: {message}")]
    UnexpectedOutput { tool: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
