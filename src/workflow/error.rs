//! Error types for workflow execution

use crate::config::StepKind;
use crate::handlers::HandlerError;
use crate::template::TemplateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories of failure that can end a run
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// A collaborator (task runner, dispatcher, action handler) failed
    #[error("handler failed: {0}")]
    StepHandler(#[from] HandlerError),

    /// Notification templates could not be rendered
    #[error("template error: {message}")]
    Template { message: String },

    /// Step config is missing a field the step type needs
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// Delay duration could not be resolved
    #[error("invalid delay duration: {spec}")]
    InvalidDelay { spec: String },

    /// Stored definition carries a step type outside the known set
    #[error("unknown step type '{type_name}'")]
    UnknownStepType { type_name: String },

    /// The run points at a step id the definition does not have
    #[error("step '{step}' does not exist in the definition")]
    UnresolvedBranch { step: String },

    /// Cancelled by an operator at a suspension boundary
    #[error("cancelled")]
    Cancelled,

    /// Too many step executions in one drive
    #[error("exceeded {limit} step transitions")]
    TransitionLimit { limit: u32 },
}

impl From<TemplateError> for ErrorKind {
    fn from(err: TemplateError) -> Self {
        ErrorKind::Template {
            message: err.to_string(),
        }
    }
}

/// Full error context for a step failure
#[derive(Debug, Clone)]
pub struct StepError {
    pub kind: ErrorKind,
    pub step: String,
    pub step_type: String,

    pub failed_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} step '{}' failed: {}", self.step_type, self.step, self.kind)
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl StepError {
    pub fn new(kind: impl Into<ErrorKind>, step: impl Into<String>, kind_of: &StepKind) -> Self {
        Self {
            kind: kind.into(),
            step: step.into(),
            step_type: kind_of.type_name().to_string(),
            failed_at: chrono::Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Persisted summary of why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Originating step, empty when the run failed outside any step
    pub step_id: String,
    pub step_type: String,
    pub reason: String,
}

impl FailureRecord {
    /// Failure raised by the engine itself rather than a step handler
    pub fn engine(step_id: impl Into<String>, kind: &ErrorKind) -> Self {
        Self {
            step_id: step_id.into(),
            step_type: String::new(),
            reason: kind.to_string(),
        }
    }

    pub fn cancelled(step_id: impl Into<String>) -> Self {
        Self::engine(step_id, &ErrorKind::Cancelled)
    }

    pub fn with_step_type(mut self, step_type: impl Into<String>) -> Self {
        self.step_type = step_type.into();
        self
    }
}

impl From<&StepError> for FailureRecord {
    fn from(err: &StepError) -> Self {
        Self {
            step_id: err.step.clone(),
            step_type: err.step_type.clone(),
            reason: err.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskConfig;

    #[test]
    fn test_step_error_display() {
        let err = StepError::new(
            HandlerError::rejected("technician calendar full"),
            "assign",
            &StepKind::Task(TaskConfig::default()),
        )
        .with_duration(12);

        let display = err.to_string();
        assert!(display.contains("task step 'assign'"));
        assert!(display.contains("technician calendar full"));
        assert_eq!(err.duration_ms, 12);
    }

    #[test]
    fn test_failure_record_from_error() {
        let err = StepError::new(
            ErrorKind::UnknownStepType {
                type_name: "webhook".into(),
            },
            "legacy",
            &StepKind::Unknown {
                type_name: "webhook".into(),
                config: serde_json::Value::Null,
            },
        );

        let record = FailureRecord::from(&err);
        assert_eq!(record.step_id, "legacy");
        assert_eq!(record.step_type, "webhook");
        assert_eq!(record.reason, "unknown step type 'webhook'");
    }

    #[test]
    fn test_cancelled_record() {
        let record = FailureRecord::cancelled("wait");
        assert_eq!(record.reason, "cancelled");
        assert_eq!(record.step_id, "wait");
        assert!(record.step_type.is_empty());

        let typed = record.with_step_type("delay");
        assert_eq!(typed.step_type, "delay");
    }
}
