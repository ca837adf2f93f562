//! Pipeline execution

pub mod engine;
pub mod executor;
pub mod preflight;

pub use engine::{EventHandler, ExecutionEvent, NoPause, PauseGate, PipelineRunner};
pub use executor::{StepContext, StepExecutor};
pub use preflight::{DependencyChecker, HostProbe, MissingDependency, ToolProbe};
