//! Workflow automation for piano service businesses
//!
//! User-defined workflows start on business events ("service completed",
//! "invoice overdue") and run a graph of typed steps against the event's
//! data. Runs can pause for days on a delay or an external acknowledgement
//! and pick up again from durable storage.

pub mod cli;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod store;
pub mod template;
pub mod workflow;
