//! Workflow automation engine
//!
//! This module handles:
//! - Structural validation of step graphs, including cycle detection
//! - Condition evaluation against a run's data record
//! - Step execution (task, notification, condition, delay, action)
//! - Suspend/resume of runs through durable storage
//!
//! # Example
//!
//! ```ignore
//! use piano_flow::handlers::Collaborators;
//! use piano_flow::store::SqliteStore;
//! use piano_flow::workflow::{ResumeSignal, WorkflowEngine};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open(&config.store.resolve_path()?)?);
//! let engine = WorkflowEngine::from_config(&config, store, Collaborators::tracing(ack));
//!
//! let definition = engine.publish(load_definition_file(path)?)?;
//! if let Some(ctx) = engine.trigger(&definition, "tech-7", data).await? {
//!     // later, when the technician finishes the task
//!     engine.resume(&ctx.id, ResumeSignal::completed()).await?;
//! }
//! ```

mod condition;
mod context;
mod engine;
mod error;
mod executor;
mod validator;

pub use condition::evaluate;
pub use context::{ExecutionContext, ExecutionStatus, Suspension};
pub use engine::{EngineError, WorkflowEngine};
pub use error::{ErrorKind, FailureRecord, StepError};
pub use executor::{ResumeSignal, StepExecutor, StepOutcome};
pub use validator::{CIRCULAR_REFERENCE, ValidationReport, validate};
