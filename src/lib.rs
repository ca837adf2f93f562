//! secboot - secure-boot image pipeline for i.MX 93 boards

pub mod cli;
pub mod core;
pub mod execution;
pub mod provider;

// Re-export commonly used types
pub use core::{
    BoardVariant, BootMedia, ConfigError, PipelineConfig, PipelineError, RunReport, RunStatus,
    StepId, StepRegistry, StepSelection, StepState, ToolSettings, Workspace,
};
pub use execution::{DependencyChecker, ExecutionEvent, NoPause, PauseGate, PipelineRunner, StepExecutor};
pub use provider::{FirmwareProvider, ProviderError, Providers, SigningProvider, ToolchainProvider};
