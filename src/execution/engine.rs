//! Pipeline runner - dispatches the selected steps in order and tracks their state

use crate::{
    core::{
        PipelineConfig, PipelineError, RunReport, RunStatus, Step, StepId, StepRecord,
        StepRegistry, StepSelection, StepState, ToolSettings, Workspace,
    },
    execution::{
        executor::{stale_requirements, StepContext, StepExecutor},
        preflight::{DependencyChecker, MissingDependency},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Events that occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        total: usize,
    },
    StepStarted {
        id: StepId,
        name: String,
        /// 1-based position within the selection
        position: usize,
        total: usize,
    },
    StepSkipped {
        id: StepId,
        name: String,
        reason: String,
        /// Outputs of the skipped step that are not in the workspace
        missing: Vec<PathBuf>,
    },
    StepCompleted {
        id: StepId,
        name: String,
    },
    StepFailed {
        id: StepId,
        name: String,
        error: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Blocks between steps until the operator continues
#[async_trait]
pub trait PauseGate: Send + Sync {
    async fn wait(&self, finished: &Step, next: &Step);
}

/// Gate for non-interactive runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPause;

#[async_trait]
impl PauseGate for NoPause {
    async fn wait(&self, _finished: &Step, _next: &Step) {}
}

/// Runs selections of the registry against a workspace
pub struct PipelineRunner {
    registry: StepRegistry,
    executor: StepExecutor,
    checker: DependencyChecker,
    tools: ToolSettings,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl PipelineRunner {
    pub fn new(
        registry: StepRegistry,
        executor: StepExecutor,
        checker: DependencyChecker,
        tools: ToolSettings,
    ) -> Self {
        Self {
            registry,
            executor,
            checker,
            tools,
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        let handlers: Vec<EventHandler> = self
            .event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Execute `selection` in ascending step order, stopping at the first failure
    pub async fn run(
        &self,
        config: &PipelineConfig,
        workspace: &Workspace,
        selection: &StepSelection,
        pause: &dyn PauseGate,
    ) -> RunReport {
        let ids = match selection.resolve(&self.registry) {
            Ok(ids) => ids,
            Err(e) => {
                let mut report = RunReport::new(Vec::new());
                report.finish(Some(e.into()));
                return report;
            }
        };

        let steps: Vec<&Step> = ids.iter().filter_map(|id| self.registry.get(*id)).collect();
        let mut report = RunReport::new(
            steps
                .iter()
                .map(|s| StepRecord {
                    id: s.id,
                    name: s.name.to_string(),
                    state: StepState::Pending,
                })
                .collect(),
        );
        let run_id = report.run_id;
        let total = steps.len();

        info!("Starting run {} with steps {:?}", run_id, ids);
        report.status = RunStatus::Running;
        self.emit_event(ExecutionEvent::RunStarted { run_id, total });

        let ctx = StepContext {
            config,
            workspace,
            tools: &self.tools,
        };

        let mut failure = None;
        for (index, step) in steps.iter().enumerate() {
            let started_at = Utc::now();
            report.steps[index].state = StepState::Running { started_at };
            self.emit_event(ExecutionEvent::StepStarted {
                id: step.id,
                name: step.name.to_string(),
                position: index + 1,
                total,
            });

            if let Some(reason) = step.skip_reason(config) {
                let missing = step.missing_outputs(workspace);
                if !missing.is_empty() {
                    debug!(
                        "Skipping step {} without its outputs; later steps may fail",
                        step.id
                    );
                }
                report.steps[index].state = StepState::Skipped {
                    reason: reason.to_string(),
                };
                self.emit_event(ExecutionEvent::StepSkipped {
                    id: step.id,
                    name: step.name.to_string(),
                    reason: reason.to_string(),
                    missing,
                });
            } else {
                match self.run_step(step, ctx).await {
                    Ok(()) => {
                        report.steps[index].state = StepState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                        };
                        self.emit_event(ExecutionEvent::StepCompleted {
                            id: step.id,
                            name: step.name.to_string(),
                        });
                    }
                    Err(e) => {
                        debug!("Step {} failed: {}", step.id, e);
                        report.steps[index].state = StepState::Failed {
                            error: e.to_string(),
                            failed_at: Utc::now(),
                        };
                        self.emit_event(ExecutionEvent::StepFailed {
                            id: step.id,
                            name: step.name.to_string(),
                            error: e.to_string(),
                        });
                        failure = Some(e);
                        break;
                    }
                }
            }

            if config.pause_between_steps {
                if let Some(next) = steps.get(index + 1) {
                    debug!("Pausing before step {}", next.id);
                    pause.wait(step, next).await;
                }
            }
        }

        report.finish(failure);
        info!("Run {} finished: {:?}", run_id, report.status);
        self.emit_event(ExecutionEvent::RunFinished {
            run_id,
            status: report.status,
        });
        report
    }

    /// Preconditions, dependencies, action, then declared outputs
    async fn run_step(&self, step: &Step, ctx: StepContext<'_>) -> Result<(), PipelineError> {
        if let Some((producer, missing)) = step.missing_requirements(ctx.workspace) {
            return Err(PipelineError::Precondition {
                step: step.id,
                step_name: step.name.to_string(),
                producer,
                producer_name: self.step_name(producer),
                missing,
            });
        }
        if let Some((producer, stale)) = stale_requirements(step, ctx) {
            return Err(PipelineError::StaleArtifact {
                step: step.id,
                step_name: step.name.to_string(),
                producer,
                producer_name: self.step_name(producer),
                stale,
            });
        }

        self.checker
            .check_required(&step.dependencies)
            .await
            .map_err(|MissingDependency(dependency)| PipelineError::MissingDependency {
                step: step.id,
                step_name: step.name.to_string(),
                dependency,
            })?;

        self.executor.execute(step, ctx).await?;

        let missing = step.missing_outputs(ctx.workspace);
        if !missing.is_empty() {
            return Err(PipelineError::MissingOutput {
                step: step.id,
                step_name: step.name.to_string(),
                missing,
            });
        }
        Ok(())
    }

    fn step_name(&self, id: StepId) -> String {
        self.registry
            .get(id)
            .map(|p| p.name.to_string())
            .unwrap_or_default()
    }
}
