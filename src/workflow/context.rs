//! Execution context - the durable record of one run

use super::error::FailureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Completed and failed runs never move again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// What a paused run is waiting for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Suspension {
    /// Task runner acknowledgement
    Task,
    /// Notification delivery result
    Notification,
    /// Wall-clock deadline
    Delay {
        #[serde(rename = "resumeAt")]
        resume_at: DateTime<Utc>,
    },
}

impl Suspension {
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Suspension::Delay { resume_at } => Some(*resume_at),
            _ => None,
        }
    }
}

/// Mutable run-record for one triggered workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub id: String,

    /// Definition this run executes (not owned)
    pub workflow_id: String,

    /// Actor or event that started the run
    pub triggered_by: String,

    /// Business payload read by conditions and patched by actions
    pub data: Map<String, Value>,

    /// Step awaiting execution, empty before the first step
    pub current_step: String,

    /// Append-only execution history
    pub completed_steps: Vec<String>,

    pub status: ExecutionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<Suspension>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,

    /// Step executions performed so far
    #[serde(default)]
    pub transitions: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Start a fresh run record
    pub fn new(
        workflow_id: impl Into<String>,
        triggered_by: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            triggered_by: triggered_by.into(),
            data,
            current_step: String::new(),
            completed_steps: Vec::new(),
            status: ExecutionStatus::Running,
            awaiting: None,
            failure: None,
            transitions: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `step_id`, recording the step being left
    pub(crate) fn advance_to(&mut self, step_id: impl Into<String>) {
        if !self.current_step.is_empty() {
            let left = std::mem::take(&mut self.current_step);
            self.completed_steps.push(left);
        }
        self.current_step = step_id.into();
        self.touch();
    }

    /// Suspend until an external signal arrives
    pub(crate) fn mark_paused(&mut self, awaiting: Suspension) {
        self.status = ExecutionStatus::Paused;
        self.awaiting = Some(awaiting);
        self.touch();
    }

    /// Continue after a suspension was acknowledged
    pub(crate) fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.awaiting = None;
        self.touch();
    }

    /// Finish; the last executed step joins the history
    pub(crate) fn mark_completed(&mut self) {
        if !self.current_step.is_empty() {
            let last = std::mem::take(&mut self.current_step);
            self.completed_steps.push(last);
        }
        self.status = ExecutionStatus::Completed;
        self.awaiting = None;
        self.touch();
    }

    /// Fail; `current_step` is left pointing at the step that failed
    pub(crate) fn mark_failed(&mut self, failure: FailureRecord) {
        self.status = ExecutionStatus::Failed;
        self.awaiting = None;
        self.failure = Some(failure);
        self.touch();
    }

    /// Shallow-merge a patch into the run data
    pub(crate) fn merge_data(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.data.insert(key, value);
        }
        self.touch();
    }

    /// Deadline of a pending delay, if any
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        self.awaiting.as_ref().and_then(Suspension::resume_at)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
