//! Step domain model

use crate::core::{config::PipelineConfig, workspace::Workspace};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Numeric step identifier; steps always execute in ascending id order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StepId(pub u8);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workspace location an artifact lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBase {
    Root,
    Inputs,
    Outputs,
    Keys,
}

/// A file inside the workspace, produced by one step and read by later ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub base: ArtifactBase,
    pub path: String,
}

impl Artifact {
    pub fn new(base: ArtifactBase, path: impl Into<String>) -> Self {
        Self {
            base,
            path: path.into(),
        }
    }

    pub fn root(path: impl Into<String>) -> Self {
        Self::new(ArtifactBase::Root, path)
    }

    pub fn inputs(path: impl Into<String>) -> Self {
        Self::new(ArtifactBase::Inputs, path)
    }

    pub fn outputs(path: impl Into<String>) -> Self {
        Self::new(ArtifactBase::Outputs, path)
    }

    pub fn keys(path: impl Into<String>) -> Self {
        Self::new(ArtifactBase::Keys, path)
    }

    /// Absolute location of the artifact in `workspace`
    pub fn resolve(&self, workspace: &Workspace) -> PathBuf {
        workspace.resolve(self.base, &self.path)
    }
}

/// An artifact a step reads, tagged with the step that writes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub producer: StepId,
    pub artifact: Artifact,
}

/// A host tool that must be present before a step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dependency {
    /// Executable found by absolute path or on `PATH`
    Executable { name: String },
    /// Module importable by the given interpreter
    Module { interpreter: String, module: String },
}

impl Dependency {
    pub fn executable(name: impl Into<String>) -> Self {
        Dependency::Executable { name: name.into() }
    }

    pub fn module(interpreter: impl Into<String>, module: impl Into<String>) -> Self {
        Dependency::Module {
            interpreter: interpreter.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Executable { name } => write!(f, "executable `{}`", name),
            Dependency::Module {
                interpreter,
                module,
            } => write!(f, "module `{}` (for {})", module, interpreter),
        }
    }
}

/// The external work a step delegates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    BuildBootloader,
    BuildTrustedFirmware,
    FetchFirmware,
    PrepareSigningEnv,
    GenerateKeys,
    WriteImageConfigs,
    ExportImage,
}

/// A single step in the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Execution order and menu number
    pub id: StepId,

    /// Short name accepted on the command line
    pub key: &'static str,

    /// Human-readable step name
    pub name: &'static str,

    /// Artifacts from earlier steps that must exist before this step runs
    pub requires: Vec<ArtifactRef>,

    /// Artifacts that must exist once the step has completed
    pub produces: Vec<Artifact>,

    /// Host tools checked right before the action runs
    pub dependencies: Vec<Dependency>,

    pub action: StepAction,
}

impl Step {
    /// Reason to skip this step under `config`, if any
    pub fn skip_reason(&self, config: &PipelineConfig) -> Option<&'static str> {
        match self.action {
            StepAction::GenerateKeys if config.skip_key_generation => {
                Some("key generation disabled")
            }
            _ => None,
        }
    }

    /// First producer whose artifacts are missing, with the missing paths
    pub fn missing_requirements(&self, workspace: &Workspace) -> Option<(StepId, Vec<PathBuf>)> {
        let mut producers: Vec<StepId> = self.requires.iter().map(|r| r.producer).collect();
        producers.sort();
        producers.dedup();

        producers.into_iter().find_map(|producer| {
            let missing: Vec<PathBuf> = self
                .requires
                .iter()
                .filter(|r| r.producer == producer)
                .map(|r| r.artifact.resolve(workspace))
                .filter(|p| !p.exists())
                .collect();
            (!missing.is_empty()).then_some((producer, missing))
        })
    }

    /// Declared outputs not present in the workspace
    pub fn missing_outputs(&self, workspace: &Workspace) -> Vec<PathBuf> {
        self.produces
            .iter()
            .map(|a| a.resolve(workspace))
            .filter(|p| !p.exists())
            .collect()
    }
}
