//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::config::WorkflowDefinition;
use crate::workflow::{ExecutionContext, ExecutionStatus, Suspension};
use serde::{Deserialize, Serialize};

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Events emitted by CLI commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    Validation {
        workflow: String,
        valid: bool,
        errors: Vec<String>,
    },
    Published {
        workflow: String,
        trigger: String,
        steps: usize,
    },
    Workflow {
        id: String,
        name: String,
        trigger: String,
        active: bool,
        version: u32,
        steps: usize,
    },
    Run {
        context_id: String,
        workflow: String,
        status: ExecutionStatus,
        current_step: String,
        completed_steps: Vec<String>,
        awaiting: Option<String>,
        failure: Option<String>,
    },
    Info {
        message: String,
    },
    Error {
        error: String,
    },
}

impl OutputEvent {
    pub fn workflow(definition: &WorkflowDefinition) -> Self {
        Self::Workflow {
            id: definition.id.clone(),
            name: definition.name.clone(),
            trigger: definition.trigger.clone(),
            active: definition.is_active,
            version: definition.version,
            steps: definition.steps.len(),
        }
    }

    pub fn run(ctx: &ExecutionContext) -> Self {
        Self::Run {
            context_id: ctx.id.clone(),
            workflow: ctx.workflow_id.clone(),
            status: ctx.status,
            current_step: ctx.current_step.clone(),
            completed_steps: ctx.completed_steps.clone(),
            awaiting: ctx.awaiting.as_ref().map(describe_suspension),
            failure: ctx
                .failure
                .as_ref()
                .map(|f| format!("{} (step '{}')", f.reason, f.step_id)),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }
}

fn describe_suspension(awaiting: &Suspension) -> String {
    match awaiting {
        Suspension::Task => "task".to_string(),
        Suspension::Notification => "notification".to_string(),
        Suspension::Delay { resume_at } => format!("delay until {}", resume_at.to_rfc3339()),
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    fn emit(&self, event: OutputEvent);
}

/// Console output handler
pub struct ConsoleHandler;

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Validation {
                workflow,
                valid,
                errors,
            } => {
                if valid {
                    println!("✓ Workflow '{}' is valid", workflow);
                } else {
                    println!("✗ Workflow '{}' has {} error(s):", workflow, errors.len());
                    for err in &errors {
                        println!("  - {}", err);
                    }
                }
            }
            OutputEvent::Published {
                workflow,
                trigger,
                steps,
            } => {
                println!(
                    "✓ Published '{}' ({} steps, trigger: {})",
                    workflow, steps, trigger
                );
            }
            OutputEvent::Workflow {
                id,
                name,
                trigger,
                active,
                version,
                steps,
            } => {
                let marker = if active { "✓" } else { "✗" };
                println!(
                    "{} {} v{} - {} [{}] ({} steps)",
                    marker, id, version, name, trigger, steps
                );
            }
            OutputEvent::Run {
                context_id,
                workflow,
                status,
                current_step,
                completed_steps,
                awaiting,
                failure,
            } => {
                println!("{} {} ({})", context_id, status, workflow);
                if !current_step.is_empty() {
                    println!("  at: {}", current_step);
                }
                if !completed_steps.is_empty() {
                    println!("  done: {}", completed_steps.join(" → "));
                }
                if let Some(awaiting) = awaiting {
                    println!("  waiting for: {}", awaiting);
                }
                if let Some(failure) = failure {
                    println!("  failed: {}", failure);
                }
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Error { error } => {
                eprintln!("Error: {}", error);
            }
        }
    }
}

/// JSON output handler, one event per line
pub struct JsonHandler;

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        if let Ok(s) = serde_json::to_string(&event) {
            println!("{}", s);
        }
    }
}

/// Quiet handler that only reports errors
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::Error { error } = event {
            eprintln!("Error: {}", error);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler),
        OutputMode::Json => Box::new(JsonHandler),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
