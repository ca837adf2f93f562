//! Error taxonomy for configuration and pipeline runs

use crate::core::step::{Dependency, StepId};
use crate::provider::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration or invocation arguments
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} `{value}`; expected one of: {expected}")]
    InvalidVariant {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid value `{value}` for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("unknown step `{0}`")]
    UnknownStep(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to load settings file {}: {message}", path.display())]
    SettingsFile { path: PathBuf, message: String },
}

/// A fatal failure of a pipeline run
///
/// Every variant aborts the remaining selection; nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("step {step} ({step_name}): missing dependency {dependency}")]
    MissingDependency {
        step: StepId,
        step_name: String,
        dependency: Dependency,
    },

    #[error(
        "step {step} ({step_name}): missing artifacts from step {producer} ({producer_name}): {}",
        join_paths(missing)
    )]
    Precondition {
        step: StepId,
        step_name: String,
        producer: StepId,
        producer_name: String,
        missing: Vec<PathBuf>,
    },

    #[error(
        "step {step} ({step_name}): artifacts from step {producer} ({producer_name}) do not match the current configuration, re-run step {producer}: {}",
        join_paths(stale)
    )]
    StaleArtifact {
        step: StepId,
        step_name: String,
        producer: StepId,
        producer_name: String,
        stale: Vec<PathBuf>,
    },

    #[error("step {step} ({step_name}) failed: {source}")]
    ExternalTool {
        step: StepId,
        step_name: String,
        #[source]
        source: ProviderError,
    },

    #[error("step {step} ({step_name}) finished without producing: {}", join_paths(missing))]
    MissingOutput {
        step: StepId,
        step_name: String,
        missing: Vec<PathBuf>,
    },

    #[error("workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid step registry: {0}")]
    Registry(String),
}

impl PipelineError {
    /// The step the error is attributed to, if any
    pub fn step(&self) -> Option<StepId> {
        match self {
            PipelineError::MissingDependency { step, .. }
            | PipelineError::Precondition { step, .. }
            | PipelineError::StaleArtifact { step, .. }
            | PipelineError::ExternalTool { step, .. }
            | PipelineError::MissingOutput { step, .. } => Some(*step),
            _ => None,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
