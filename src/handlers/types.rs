//! Core types and traits for external collaborators

use crate::config::Channel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error types a collaborator can report
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Collaborator could not be reached
    #[error("unavailable: {message}")]
    Unavailable { message: String },

    /// Collaborator refused the request
    #[error("rejected: {message}")]
    Rejected { message: String },

    /// No action handler registered under this key
    #[error("no handler registered for action '{action_type}'")]
    UnknownAction { action_type: String },

    /// Failure reported asynchronously through `resume`
    #[error("reported failure: {reason}")]
    Reported { reason: String },
}

impl HandlerError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unknown_action(action_type: impl Into<String>) -> Self {
        Self::UnknownAction {
            action_type: action_type.into(),
        }
    }

    pub fn reported(reason: impl Into<String>) -> Self {
        Self::Reported {
            reason: reason.into(),
        }
    }
}

/// Work item handed to the task runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Run to resume once the task is done
    pub context_id: String,
    pub step_id: String,
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub data: Map<String, Value>,
}

/// Rendered message handed to the notification dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub context_id: String,
    pub step_id: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Dispatcher verdict for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered; the run can move on
    Delivered,
    /// Accepted; the result arrives later through `resume`
    Pending,
}

/// Invocation of a side-effecting action
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub context_id: String,
    pub step_id: String,
    pub params: Map<String, Value>,
    pub data: Map<String, Value>,
}

/// Creates work items for `task` steps
///
/// Completion is reported later by calling the engine's `resume`.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn assign(&self, request: &TaskRequest) -> Result<(), HandlerError>;
}

/// Delivers rendered notifications (email, push, SMS)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> Result<Dispatch, HandlerError>;
}

/// Side-effecting action returning a data patch for the run
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, request: &ActionRequest) -> Result<Map<String, Value>, HandlerError>;
}

/// Arranges a future `resume` for a delayed run
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, context_id: &str, at: DateTime<Utc>) -> Result<(), HandlerError>;
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
