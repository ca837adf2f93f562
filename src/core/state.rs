//! Execution state models

use crate::core::{error::PipelineError, step::StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Steps are being dispatched
    Running,
    /// Every selected step completed or was skipped
    Completed,
    /// A step failed and the rest of the selection was abandoned
    Failed,
}

/// State of a single step within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepState {
    /// Waiting for its turn (or never reached)
    Pending,
    /// Currently running
    Running { started_at: DateTime<Utc> },
    /// Action succeeded and declared outputs are present
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Precondition, dependency, or external tool failure
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
    /// Deliberately not run
    Skipped { reason: String },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// One selected step and where it ended up
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: StepId,
    pub name: String,
    pub state: StepState,
}

/// Outcome of a run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Selected steps in execution order
    pub steps: Vec<StepRecord>,
    /// The error that stopped the run
    pub failure: Option<PipelineError>,
}

impl RunReport {
    pub fn new(records: Vec<StepRecord>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            steps: records,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn state_of(&self, id: StepId) -> Option<&StepState> {
        self.steps.iter().find(|r| r.id == id).map(|r| &r.state)
    }

    /// Ids of steps that actually ran (completed or failed), in order
    pub fn executed(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|r| matches!(r.state, StepState::Completed { .. } | StepState::Failed { .. }))
            .map(|r| r.id)
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&StepState) -> bool) -> usize {
        self.steps.iter().filter(|r| predicate(&r.state)).count()
    }

    pub(crate) fn finish(&mut self, failure: Option<PipelineError>) {
        self.status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }
}
