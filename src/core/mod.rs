//! Core domain models for the secure-boot pipeline
//!
//! This module defines configuration, the step registry, run state and the
//! workspace layout. Nothing in here talks to external tools.

pub mod config;
pub mod error;
pub mod packaging;
pub mod registry;
pub mod selection;
pub mod state;
pub mod step;
pub mod workspace;

pub use config::{BoardVariant, BootMedia, PipelineConfig, ToolSettings};
pub use error::{ConfigError, PipelineError};
pub use registry::StepRegistry;
pub use selection::StepSelection;
pub use state::{RunReport, RunStatus, StepRecord, StepState};
pub use step::{Artifact, ArtifactRef, Dependency, Step, StepAction, StepId};
pub use workspace::Workspace;
