//! CLI command implementations
//!
//! Each command returns the process exit code; `Err` is reserved for
//! failures outside the command's own domain (store, I/O, bad input).

use super::output::{OutputEvent, OutputHandler};
use crate::config::load_definition_file;
use crate::workflow::{EngineError, ExecutionStatus, ResumeSignal, WorkflowEngine, validate};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::Path;

/// Validate a definition file without publishing it
pub fn validate_definition(path: &Path, handler: &dyn OutputHandler) -> Result<i32> {
    let definition = load_definition_file(path)?;
    let report = validate(&definition);

    handler.emit(OutputEvent::Validation {
        workflow: definition.id,
        valid: report.valid,
        errors: report.errors,
    });

    Ok(if report.valid { 0 } else { 1 })
}

/// Validate, activate and store a definition file
pub fn publish_definition(
    engine: &WorkflowEngine,
    path: &Path,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let definition = load_definition_file(path)?;

    match engine.publish(definition) {
        Ok(published) => {
            handler.emit(OutputEvent::Published {
                workflow: published.id,
                trigger: published.trigger,
                steps: published.steps.len(),
            });
            Ok(0)
        }
        Err(EngineError::DefinitionInvalid { id, errors }) => {
            handler.emit(OutputEvent::Validation {
                workflow: id,
                valid: false,
                errors,
            });
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

/// List stored definitions
pub fn list_workflows(engine: &WorkflowEngine, handler: &dyn OutputHandler) -> Result<i32> {
    let definitions = engine.store().list_definitions()?;
    if definitions.is_empty() {
        handler.emit(OutputEvent::info("(no workflows published)"));
    }
    for definition in &definitions {
        handler.emit(OutputEvent::workflow(definition));
    }
    Ok(0)
}

/// Start a run of one stored workflow
pub async fn trigger_workflow(
    engine: &WorkflowEngine,
    workflow_id: &str,
    triggered_by: &str,
    data: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let data = parse_data(data)?;

    match engine.trigger_by_id(workflow_id, triggered_by, data).await? {
        Some(ctx) => handler.emit(OutputEvent::run(&ctx)),
        None => handler.emit(OutputEvent::info(format!(
            "Workflow '{}' is inactive; no run started",
            workflow_id
        ))),
    }
    Ok(0)
}

/// Fire a business event at every active workflow listening on it
pub async fn emit_event(
    engine: &WorkflowEngine,
    event: &str,
    triggered_by: &str,
    data: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let data = parse_data(data)?;
    let started = engine.trigger_event(event, triggered_by, data).await?;

    if started.is_empty() {
        handler.emit(OutputEvent::info(format!(
            "No active workflows listen on '{}'",
            event
        )));
    }
    for ctx in &started {
        handler.emit(OutputEvent::run(ctx));
    }
    Ok(0)
}

/// Acknowledge the step a paused run is waiting on
pub async fn resume_run(
    engine: &WorkflowEngine,
    context_id: &str,
    data: Option<&str>,
    fail: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let signal = match fail {
        Some(reason) => ResumeSignal::failed(reason),
        None => ResumeSignal::Completed {
            patch: parse_data(data)?,
        },
    };

    let ctx = engine.resume(context_id, signal).await?;
    handler.emit(OutputEvent::run(&ctx));
    Ok(0)
}

pub async fn cancel_run(
    engine: &WorkflowEngine,
    context_id: &str,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let ctx = engine.cancel(context_id).await?;
    handler.emit(OutputEvent::run(&ctx));
    Ok(0)
}

pub fn show_status(
    engine: &WorkflowEngine,
    context_id: &str,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let ctx = engine.context(context_id)?;
    handler.emit(OutputEvent::run(&ctx));
    Ok(0)
}

/// List runs, optionally only those with `status`
pub fn list_runs(
    engine: &WorkflowEngine,
    status: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let status = status
        .map(str::parse::<ExecutionStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let contexts = engine.store().list_contexts(status)?;
    if contexts.is_empty() {
        handler.emit(OutputEvent::info("(no runs)"));
    }
    for ctx in &contexts {
        handler.emit(OutputEvent::run(ctx));
    }
    Ok(0)
}

/// Resume every delay whose deadline has passed
pub async fn tick(engine: &WorkflowEngine, handler: &dyn OutputHandler) -> Result<i32> {
    let resumed = engine.resume_due().await?;

    for ctx in &resumed {
        handler.emit(OutputEvent::run(ctx));
    }
    handler.emit(OutputEvent::info(format!(
        "{} delayed run(s) resumed",
        resumed.len()
    )));
    Ok(0)
}

/// Parse a `--data` argument into a data record
fn parse_data(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<Value>(raw).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--data must be a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationAck;
    use crate::handlers::Collaborators;
    use crate::store::SqliteStore;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockHandler {
        events: Mutex<Vec<OutputEvent>>,
    }

    impl MockHandler {
        fn events(&self) -> Vec<OutputEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl OutputHandler for MockHandler {
        fn emit(&self, event: OutputEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    const TUNING_REMINDER: &str = r#"
id = "tuning-reminder"
name = "Tuning reminder"
trigger = "service.completed"

[[steps]]
id = "wait"
type = "delay"
name = "Wait six months"
config = { duration = { amount = 26, unit = "weeks" } }
nextSteps = ["remind"]

[[steps]]
id = "remind"
type = "notification"
name = "Remind client"
config = { template = "Time for a tuning, {{ client }}!", recipient = "{{ email }}" }
"#;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Collaborators::tracing(NotificationAck::Sync),
        )
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_data() {
        assert!(parse_data(None).unwrap().is_empty());
        assert_eq!(parse_data(Some(r#"{"amount": 150}"#)).unwrap()["amount"], 150);
        assert!(parse_data(Some("[1, 2]")).is_err());
        assert!(parse_data(Some("{nope")).is_err());
    }

    #[test]
    fn test_validate_reports_errors() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.toml", TUNING_REMINDER);
        let bad = write(
            &dir,
            "bad.json",
            r#"{"id": "broken", "name": "", "trigger": "t", "steps": []}"#,
        );

        let handler = MockHandler::default();
        assert_eq!(validate_definition(&good, &handler).unwrap(), 0);
        assert_eq!(validate_definition(&bad, &handler).unwrap(), 1);

        let events = handler.events();
        assert!(matches!(events[0], OutputEvent::Validation { valid: true, .. }));
        match &events[1] {
            OutputEvent::Validation { valid, errors, .. } => {
                assert!(!valid);
                assert_eq!(
                    errors,
                    &vec![
                        "Workflow name is required".to_string(),
                        "Workflow must have at least one step".to_string(),
                    ]
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_emit_and_status() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "reminder.toml", TUNING_REMINDER);
        let engine = engine();
        let handler = MockHandler::default();

        assert_eq!(publish_definition(&engine, &path, &handler).unwrap(), 0);
        assert_eq!(
            emit_event(
                &engine,
                "service.completed",
                "tech-3",
                Some(r#"{"client": "Ada", "email": "ada@example.com"}"#),
                &handler,
            )
            .await
            .unwrap(),
            0
        );

        let context_id = match handler.events().last() {
            Some(OutputEvent::Run {
                context_id, status, ..
            }) => {
                assert_eq!(*status, ExecutionStatus::Paused);
                context_id.clone()
            }
            other => panic!("unexpected event: {:?}", other),
        };

        assert_eq!(show_status(&engine, &context_id, &handler).unwrap(), 0);
        assert_eq!(list_runs(&engine, Some("paused"), &handler).unwrap(), 0);
        assert!(list_runs(&engine, Some("sleeping"), &handler).is_err());

        assert_eq!(cancel_run(&engine, &context_id, &handler).await.unwrap(), 0);
        assert!(cancel_run(&engine, &context_id, &handler).await.is_err());
    }

    #[tokio::test]
    async fn test_trigger_unknown_workflow_errors() {
        let engine = engine();
        let handler = MockHandler::default();
        assert!(
            trigger_workflow(&engine, "missing", "x", None, &handler)
                .await
                .is_err()
        );
    }
}
