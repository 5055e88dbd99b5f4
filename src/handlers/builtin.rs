//! Built-in collaborators used by the CLI and tests

use super::types::{
    Clock, Dispatch, HandlerError, Notification, NotificationDispatcher, Scheduler, TaskRequest,
    TaskRunner,
};
use crate::config::NotificationAck;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Logs assigned tasks; completion comes from `piano-flow resume`
#[derive(Debug, Default)]
pub struct TracingTaskRunner;

#[async_trait]
impl TaskRunner for TracingTaskRunner {
    async fn assign(&self, request: &TaskRequest) -> Result<(), HandlerError> {
        tracing::info!(
            context_id = %request.context_id,
            step = %request.step_id,
            assignee = request.assignee.as_deref().unwrap_or("-"),
            "Task assigned: {}",
            request.title
        );
        Ok(())
    }
}

/// Logs notifications instead of sending them
#[derive(Debug, Default)]
pub struct TracingDispatcher {
    ack: NotificationAck,
}

impl TracingDispatcher {
    pub fn new(ack: NotificationAck) -> Self {
        Self { ack }
    }
}

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<Dispatch, HandlerError> {
        if notification.recipient.trim().is_empty() {
            return Err(HandlerError::rejected("empty recipient"));
        }

        tracing::info!(
            context_id = %notification.context_id,
            step = %notification.step_id,
            channel = %notification.channel,
            recipient = %notification.recipient,
            "{}",
            notification.body
        );

        Ok(match self.ack {
            NotificationAck::Sync => Dispatch::Delivered,
            NotificationAck::Async => Dispatch::Pending,
        })
    }
}

/// Relies on `WorkflowEngine::resume_due` being polled
#[derive(Debug, Default)]
pub struct PollingScheduler;

#[async_trait]
impl Scheduler for PollingScheduler {
    async fn schedule(&self, context_id: &str, at: DateTime<Utc>) -> Result<(), HandlerError> {
        tracing::debug!(context_id, resume_at = %at, "Delay registered for polling");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: chrono::TimeDelta) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
