//! CLI module for piano-flow
//!
//! This module provides:
//! - Command implementations (validate, publish, trigger, resume, etc.)
//! - Output handlers (console, JSON, quiet)
//!
//! # Example
//!
//! ```ignore
//! use piano_flow::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console);
//! let exit_code = commands::resume_run(&engine, &context_id, None, None, &*handler).await?;
//! ```

pub mod commands;
pub mod output;

pub use commands::{
    cancel_run, emit_event, list_runs, list_workflows, publish_definition, resume_run,
    show_status, tick, trigger_workflow, validate_definition,
};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
