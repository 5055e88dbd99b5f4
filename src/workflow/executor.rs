//! Step execution logic
//!
//! Runs one step against a context and decides where the run goes next.
//! Handler failures never escape as `Err`: they come back as
//! `StepOutcome::Fail` so the engine can record them on the context.

use super::condition::evaluate;
use super::context::{ExecutionContext, Suspension};
use super::error::{ErrorKind, StepError};
use crate::config::{
    ActionConfig, Condition, DelayConfig, NotificationConfig, StepKind, TaskConfig,
    WorkflowDefinition, WorkflowStep,
};
use crate::handlers::{
    ActionRequest, Clock, Collaborators, Dispatch, HandlerError, Notification, TaskRequest,
};
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

/// What the engine should do after a step ran
#[derive(Debug)]
pub enum StepOutcome {
    /// Continue with this step id
    Advance(String),
    /// Persist and wait for an external signal
    Suspend(Suspension),
    /// No successor on the chosen branch
    Complete,
    Fail(StepError),
}

/// External input delivered to a suspended run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ResumeSignal {
    /// The awaited work finished; tasks may return a data patch
    Completed {
        #[serde(default)]
        patch: Map<String, Value>,
    },
    /// The awaited work failed
    Failed { reason: String },
}

impl ResumeSignal {
    pub fn completed() -> Self {
        Self::Completed { patch: Map::new() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Dispatches steps by type against the collaborators
pub struct StepExecutor {
    collaborators: Collaborators,
    templates: TemplateEngine,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            templates: TemplateEngine::new(),
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.collaborators.clock.as_ref()
    }

    /// Syntax-check every notification template in `definition`
    ///
    /// Only parsing is checked; data-dependent failures still surface at
    /// run time.
    pub fn check_templates(&self, definition: &WorkflowDefinition) -> Vec<String> {
        let mut errors = Vec::new();
        for step in &definition.steps {
            let StepKind::Notification(config) = &step.kind else {
                continue;
            };
            let fields = [
                ("template", Some(config.template.as_str())),
                ("recipient", Some(config.recipient.as_str())),
                ("subject", config.subject.as_deref()),
            ];
            for (field, source) in fields {
                let Some(source) = source else { continue };
                if let Err(e) = self.templates.validate(source) {
                    errors.push(format!("Step '{}' has an invalid {}: {}", step.id, field, e));
                }
            }
        }
        errors
    }

    /// Execute `step`, which must be the context's current step
    pub async fn execute(&self, step: &WorkflowStep, ctx: &mut ExecutionContext) -> StepOutcome {
        let start = Instant::now();

        tracing::debug!(
            context_id = %ctx.id,
            step = %step.id,
            step_type = step.kind.type_name(),
            "Executing step"
        );

        let result = match &step.kind {
            StepKind::Task(config) => self.execute_task(step, config, ctx).await,
            StepKind::Notification(config) => self.execute_notification(step, config, ctx).await,
            StepKind::Condition(condition) => Ok(execute_condition(step, condition, ctx)),
            StepKind::Delay(config) => self.execute_delay(config, ctx).await,
            StepKind::Action(config) => self.execute_action(step, config, ctx).await,
            StepKind::Unknown { type_name, .. } => Err(ErrorKind::UnknownStepType {
                type_name: type_name.clone(),
            }),
        };

        result.unwrap_or_else(|kind| {
            StepOutcome::Fail(
                StepError::new(kind, &step.id, &step.kind).with_duration(
                    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                ),
            )
        })
    }

    /// Finish a suspended step once its external signal arrived
    ///
    /// Delay deadlines are checked by the caller; by the time a signal gets
    /// here the wait is over.
    pub fn acknowledge(
        &self,
        step: &WorkflowStep,
        ctx: &mut ExecutionContext,
        signal: ResumeSignal,
    ) -> StepOutcome {
        match signal {
            ResumeSignal::Failed { reason } => StepOutcome::Fail(StepError::new(
                HandlerError::reported(reason),
                &step.id,
                &step.kind,
            )),
            ResumeSignal::Completed { patch } => {
                if matches!(step.kind, StepKind::Task(_)) && !patch.is_empty() {
                    ctx.merge_data(patch);
                }
                advance_or_complete(step, 0)
            }
        }
    }

    async fn execute_task(
        &self,
        step: &WorkflowStep,
        config: &TaskConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, ErrorKind> {
        let request = TaskRequest {
            context_id: ctx.id.clone(),
            step_id: step.id.clone(),
            title: config.title.clone().unwrap_or_else(|| step.name.clone()),
            description: config.description.clone(),
            assignee: config.assignee.clone(),
            data: ctx.data.clone(),
        };

        self.collaborators.tasks.assign(&request).await?;
        Ok(StepOutcome::Suspend(Suspension::Task))
    }

    async fn execute_notification(
        &self,
        step: &WorkflowStep,
        config: &NotificationConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, ErrorKind> {
        if config.template.trim().is_empty() {
            return Err(missing("template"));
        }
        if config.recipient.trim().is_empty() {
            return Err(missing("recipient"));
        }

        let body = self.templates.render(&config.template, &ctx.data)?;
        let recipient = self.templates.render_trimmed(&config.recipient, &ctx.data)?;
        let subject = config
            .subject
            .as_deref()
            .map(|s| self.templates.render_trimmed(s, &ctx.data))
            .transpose()?;

        let notification = Notification {
            context_id: ctx.id.clone(),
            step_id: step.id.clone(),
            channel: config.channel,
            recipient,
            subject,
            body,
        };

        match self.collaborators.notifications.dispatch(&notification).await? {
            Dispatch::Delivered => Ok(advance_or_complete(step, 0)),
            Dispatch::Pending => Ok(StepOutcome::Suspend(Suspension::Notification)),
        }
    }

    async fn execute_delay(
        &self,
        config: &DelayConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, ErrorKind> {
        let spec = config.duration.as_ref().ok_or_else(|| missing("duration"))?;
        let invalid = || ErrorKind::InvalidDelay {
            spec: format!("{:?}", spec),
        };
        let duration = spec.to_duration().ok_or_else(invalid)?;

        // Deadlines past the representable calendar are rejected, not wrapped
        let resume_at = self
            .clock()
            .now()
            .checked_add_signed(duration)
            .ok_or_else(invalid)?;
        self.collaborators
            .scheduler
            .schedule(&ctx.id, resume_at)
            .await?;

        Ok(StepOutcome::Suspend(Suspension::Delay { resume_at }))
    }

    async fn execute_action(
        &self,
        step: &WorkflowStep,
        config: &ActionConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<StepOutcome, ErrorKind> {
        if config.action_type.trim().is_empty() {
            return Err(missing("actionType"));
        }

        let request = ActionRequest {
            context_id: ctx.id.clone(),
            step_id: step.id.clone(),
            params: config.params.clone(),
            data: ctx.data.clone(),
        };

        let patch = self
            .collaborators
            .actions
            .invoke(&config.action_type, &request)
            .await?;
        ctx.merge_data(patch);

        Ok(advance_or_complete(step, 0))
    }
}

/// Branch on the condition: slot 0 when true, slot 1 when false
fn execute_condition(
    step: &WorkflowStep,
    condition: &Condition,
    ctx: &ExecutionContext,
) -> StepOutcome {
    let matched = evaluate(condition, &ctx.data);
    tracing::debug!(step = %step.id, field = %condition.field, matched, "Condition evaluated");
    advance_or_complete(step, if matched { 0 } else { 1 })
}

/// An absent successor is a defined dead end, not an error
fn advance_or_complete(step: &WorkflowStep, slot: usize) -> StepOutcome {
    match step.successor(slot) {
        Some(next) => StepOutcome::Advance(next.to_string()),
        None => StepOutcome::Complete,
    }
}

fn missing(field: &str) -> ErrorKind {
    ErrorKind::MissingField {
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Channel, DelaySpec, NotificationAck, Operator};
    use crate::handlers::{ActionRegistry, ManualClock, NotificationDispatcher, TaskRunner};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationDispatcher for Arc<RecordingDispatcher> {
        async fn dispatch(&self, notification: &Notification) -> Result<Dispatch, HandlerError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(Dispatch::Delivered)
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl TaskRunner for FailingRunner {
        async fn assign(&self, _request: &TaskRequest) -> Result<(), HandlerError> {
            Err(HandlerError::unavailable("task board offline"))
        }
    }

    fn context(data: Value) -> ExecutionContext {
        ExecutionContext::new("wf", "tester", data.as_object().cloned().unwrap())
    }

    fn executor() -> StepExecutor {
        StepExecutor::new(Collaborators::tracing(NotificationAck::Sync))
    }

    fn condition_step() -> WorkflowStep {
        WorkflowStep::new(
            "check",
            "Big invoice?",
            StepKind::Condition(Condition::new("amount", Operator::GreaterThan, 100)),
        )
        .then(["vip", "regular"])
    }

    #[tokio::test]
    async fn test_condition_branches() {
        let executor = executor();
        let step = condition_step();

        let mut ctx = context(json!({"amount": 150}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Advance(ref next) if next == "vip"
        ));

        let mut ctx = context(json!({"amount": 100}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Advance(ref next) if next == "regular"
        ));
    }

    #[tokio::test]
    async fn test_condition_missing_branch_completes() {
        let executor = executor();
        let step = condition_step().then(["vip"]);

        let mut ctx = context(json!({"amount": 5}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Complete
        ));
    }

    #[tokio::test]
    async fn test_task_suspends() {
        let executor = executor();
        let step = WorkflowStep::new("t", "Schedule tuning", StepKind::Task(TaskConfig::default()))
            .then(["next"]);

        let mut ctx = context(json!({}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Suspend(Suspension::Task)
        ));

        let outcome = executor.acknowledge(
            &step,
            &mut ctx,
            ResumeSignal::Completed {
                patch: json!({"tuned_at": "2026-10-17"}).as_object().cloned().unwrap(),
            },
        );
        assert!(matches!(outcome, StepOutcome::Advance(ref next) if next == "next"));
        assert_eq!(ctx.data["tuned_at"], "2026-10-17");
    }

    #[tokio::test]
    async fn test_task_runner_failure() {
        let executor = StepExecutor::new(
            Collaborators::tracing(NotificationAck::Sync).with_tasks(FailingRunner),
        );
        let step = WorkflowStep::new("t", "Task", StepKind::Task(TaskConfig::default()));

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => {
                assert_eq!(err.step, "t");
                assert_eq!(err.step_type, "task");
                assert!(matches!(err.kind, ErrorKind::StepHandler(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notification_rendered_and_delivered() {
        let recorder = Arc::new(RecordingDispatcher::default());
        let executor = StepExecutor::new(
            Collaborators::tracing(NotificationAck::Sync).with_notifications(recorder.clone()),
        );
        let step = WorkflowStep::new(
            "notify",
            "Thank client",
            StepKind::Notification(NotificationConfig {
                template: "Thanks {{ client }}, total {{ amount | currency }}".into(),
                recipient: "{{ email }}".into(),
                channel: Channel::Email,
                subject: Some("Service for {{ client }}".into()),
            }),
        );

        let mut ctx = context(json!({"client": "Ada", "amount": 180, "email": "ada@example.com"}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Complete
        ));

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Thanks Ada, total $180.00");
        assert_eq!(sent[0].recipient, "ada@example.com");
        assert_eq!(sent[0].subject.as_deref(), Some("Service for Ada"));
    }

    #[tokio::test]
    async fn test_notification_async_ack_suspends() {
        let executor = StepExecutor::new(Collaborators::tracing(NotificationAck::Async));
        let step = WorkflowStep::new(
            "notify",
            "Remind",
            StepKind::Notification(NotificationConfig {
                template: "Reminder".into(),
                recipient: "555-0100".into(),
                ..Default::default()
            }),
        );

        let mut ctx = context(json!({}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Suspend(Suspension::Notification)
        ));
    }

    #[tokio::test]
    async fn test_notification_template_error_fails() {
        let executor = executor();
        let step = WorkflowStep::new(
            "notify",
            "Remind",
            StepKind::Notification(NotificationConfig {
                template: "Hi {{ client }}".into(),
                recipient: "a@b.c".into(),
                ..Default::default()
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => assert!(matches!(err.kind, ErrorKind::Template { .. })),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notification_missing_recipient() {
        let executor = executor();
        let step = WorkflowStep::new(
            "notify",
            "Remind",
            StepKind::Notification(NotificationConfig {
                template: "Hello".into(),
                ..Default::default()
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => {
                assert_eq!(err.kind.to_string(), "missing required field 'recipient'")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delay_computes_deadline() {
        let start = chrono::Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let executor = StepExecutor::new(
            Collaborators::tracing(NotificationAck::Sync).with_clock(clock.clone()),
        );
        let step = WorkflowStep::new(
            "wait",
            "Wait",
            StepKind::Delay(DelayConfig {
                duration: Some(DelaySpec::Compact("3d".into())),
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Suspend(Suspension::Delay { resume_at }) => {
                assert_eq!(resume_at, start + chrono::TimeDelta::days(3));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delay_invalid_duration() {
        let executor = executor();
        let step = WorkflowStep::new(
            "wait",
            "Wait",
            StepKind::Delay(DelayConfig {
                duration: Some(DelaySpec::Compact("eventually".into())),
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => assert!(matches!(err.kind, ErrorKind::InvalidDelay { .. })),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delay_beyond_calendar_fails() {
        let executor = executor();
        let step = WorkflowStep::new(
            "wait",
            "Wait forever",
            StepKind::Delay(DelayConfig {
                duration: Some(DelaySpec::Compact("100000000w".into())),
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => {
                assert_eq!(err.step_type, "delay");
                assert!(matches!(err.kind, ErrorKind::InvalidDelay { .. }));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notification_bad_strftime_fails() {
        let executor = executor();
        let step = WorkflowStep::new(
            "notify",
            "Remind",
            StepKind::Notification(NotificationConfig {
                template: "Booked {{ 'now' | strftime('%Q') }}".into(),
                recipient: "a@b.c".into(),
                ..Default::default()
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => assert!(matches!(err.kind, ErrorKind::Template { .. })),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_merges_patch() {
        let executor = executor();
        let step = WorkflowStep::new(
            "update",
            "Update piano condition",
            StepKind::Action(ActionConfig {
                action_type: "set_fields".into(),
                params: json!({"pianoCondition": "excellent"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }),
        )
        .then(["done"]);

        let mut ctx = context(json!({"pianoCondition": "fair"}));
        assert!(matches!(
            executor.execute(&step, &mut ctx).await,
            StepOutcome::Advance(ref next) if next == "done"
        ));
        assert_eq!(ctx.data["pianoCondition"], "excellent");
    }

    #[tokio::test]
    async fn test_action_without_handler_fails() {
        let executor = StepExecutor::new(
            Collaborators::tracing(NotificationAck::Sync).with_actions(ActionRegistry::new()),
        );
        let step = WorkflowStep::new(
            "update",
            "Update",
            StepKind::Action(ActionConfig {
                action_type: "update_piano".into(),
                params: Map::new(),
            }),
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => {
                assert!(err.to_string().contains("no handler registered for action 'update_piano'"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let executor = executor();
        let step = WorkflowStep::new(
            "x",
            "Legacy",
            StepKind::Unknown {
                type_name: "webhook".into(),
                config: Value::Null,
            },
        );

        let mut ctx = context(json!({}));
        match executor.execute(&step, &mut ctx).await {
            StepOutcome::Fail(err) => {
                assert!(matches!(err.kind, ErrorKind::UnknownStepType { .. }));
                assert_eq!(err.step_type, "webhook");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_failed_signal() {
        let executor = executor();
        let step = WorkflowStep::new("t", "Task", StepKind::Task(TaskConfig::default()));
        let mut ctx = context(json!({}));

        match executor.acknowledge(&step, &mut ctx, ResumeSignal::failed("piano moved")) {
            StepOutcome::Fail(err) => assert!(err.to_string().contains("piano moved")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_resume_signal_json() {
        let signal: ResumeSignal =
            serde_json::from_value(json!({"outcome": "completed"})).unwrap();
        assert_eq!(signal, ResumeSignal::completed());

        let signal: ResumeSignal =
            serde_json::from_value(json!({"outcome": "failed", "reason": "bounced"})).unwrap();
        assert_eq!(signal, ResumeSignal::failed("bounced"));
    }
}
