//! External collaborators: toolchain, firmware acquisition and signing
//!
//! The pipeline only sequences these calls. Each capability is a trait so the
//! production implementations (which shell out to vendor tools) can be swapped
//! for fakes in tests.

pub mod command;
pub mod error;
pub mod firmware;
pub mod signing;
pub mod toolchain;

use crate::core::{config::RepoRef, BootMedia, Workspace};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::ProviderError;
pub use firmware::HttpFirmwareProvider;
pub use signing::SpsdkSigningProvider;
pub use toolchain::GitMakeToolchain;

/// What to build in a checked-out source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Name used in messages, e.g. `u-boot`
    pub name: String,
    /// Configuration target run before the build, if any
    pub defconfig: Option<String>,
    /// Extra `make` arguments (variables and goals)
    pub make_args: Vec<String>,
    pub cross_compile: String,
    /// Expected outputs, relative to the source tree
    pub outputs: Vec<PathBuf>,
}

/// Source checkout and cross-compilation
#[async_trait]
pub trait ToolchainProvider: Send + Sync {
    /// Clone `repo` into `dest`; no-op if `dest` is already a checkout
    async fn clone_repo(&self, repo: &RepoRef, dest: &Path) -> Result<PathBuf, ProviderError>;

    /// Build `target` in `source`, returning absolute output paths in `target.outputs` order
    async fn build(&self, source: &Path, target: &BuildTarget) -> Result<Vec<PathBuf>, ProviderError>;
}

/// Vendor firmware download and self-extraction
#[async_trait]
pub trait FirmwareProvider: Send + Sync {
    /// Download `url` into `dir`; skipped if the file is already there
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ProviderError>;

    /// Run a self-extracting archive; refuses unless `accept_eula` is set
    async fn self_extract(&self, archive: &Path, accept_eula: bool) -> Result<PathBuf, ProviderError>;
}

/// Key pair produced by the signing toolkit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PathBuf,
    pub public: PathBuf,
}

/// SHA-256 digest over the SRK table, as fused into the SoC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrkDigest(pub [u8; 32]);

impl SrkDigest {
    /// Parse 64 hex digits, with or without a `0x` prefix
    pub fn from_hex(digits: &str) -> Option<Self> {
        let digits = digits.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        let bytes: [u8; 32] = hex::decode(digits).ok()?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Digest as the eight little-endian 32-bit fuse words
    pub fn fuse_words(&self) -> [u32; 8] {
        let mut words = [0u32; 8];
        for (i, chunk) in self.0.chunks_exact(4).enumerate() {
            words[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }
}

/// Which packaging document an export consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingKind {
    Container,
    BootableImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub kind: PackagingKind,
    pub config: PathBuf,
    pub output: PathBuf,
}

/// Metadata a bootable image is verified against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub family: String,
    pub revision: String,
    pub media: BootMedia,
}

/// Key management, SRK hashing, packaging and verification
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// Install the toolkit into the workspace
    async fn prepare_environment(&self, workspace: &Workspace) -> Result<(), ProviderError>;

    async fn generate_key_pair(
        &self,
        curve: &str,
        private: &Path,
        public: &Path,
    ) -> Result<KeyPair, ProviderError>;

    /// Whether `public` belongs to `private`
    async fn verify_key_pair(&self, private: &Path, public: &Path) -> Result<bool, ProviderError>;

    /// Write the SRK table for `public_keys` to `table` and return its digest
    async fn srk_table(&self, public_keys: &[PathBuf], table: &Path) -> Result<SrkDigest, ProviderError>;

    /// Produce a signed container or bootable image from a packaging document
    async fn export_image(&self, request: &ExportRequest) -> Result<PathBuf, ProviderError>;

    async fn verify_image(&self, image: &Path, metadata: &ImageMetadata) -> Result<(), ProviderError>;
}

/// The collaborators a run delegates to
#[derive(Clone)]
pub struct Providers {
    pub toolchain: Arc<dyn ToolchainProvider>,
    pub firmware: Arc<dyn FirmwareProvider>,
    pub signing: Arc<dyn SigningProvider>,
}

impl Providers {
    /// Vendor tools on the host
    pub fn production(tools: &crate::core::ToolSettings, workspace: &Workspace) -> Self {
        Self {
            toolchain: Arc::new(GitMakeToolchain::new(tools.command_timeout_secs)),
            firmware: Arc::new(HttpFirmwareProvider::new(tools.command_timeout_secs)),
            signing: Arc::new(SpsdkSigningProvider::new(
                &tools.signing,
                workspace,
                tools.command_timeout_secs,
            )),
        }
    }
}
