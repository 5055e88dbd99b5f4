//! Durable storage for workflow definitions and run contexts
//!
//! A suspended run lives only here between its pause and its resume, so the
//! engine writes the context before reporting any suspension.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::config::WorkflowDefinition;
use crate::workflow::{ExecutionContext, ExecutionStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Storage the engine reads and writes through
pub trait Persistence: Send + Sync {
    /// Insert or replace a definition by id
    fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()>;

    fn load_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>>;

    /// All definitions ordered by id
    fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>>;

    /// Active definitions listening on `trigger`
    fn active_for_trigger(&self, trigger: &str) -> Result<Vec<WorkflowDefinition>> {
        Ok(self
            .list_definitions()?
            .into_iter()
            .filter(|d| d.is_active && d.trigger == trigger)
            .collect())
    }

    /// Insert or replace a context by id
    fn save_context(&self, context: &ExecutionContext) -> Result<()>;

    fn load_context(&self, id: &str) -> Result<Option<ExecutionContext>>;

    /// Contexts ordered by creation time, optionally filtered by status
    fn list_contexts(&self, status: Option<ExecutionStatus>) -> Result<Vec<ExecutionContext>>;

    /// Ids of paused contexts whose delay deadline is at or before `now`
    fn due_delays(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
}
