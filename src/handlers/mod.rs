//! External collaborators of the workflow engine
//!
//! The engine never talks to email gateways, task boards, or schedulers
//! directly. It goes through the traits defined here:
//!
//! - `TaskRunner` creates work items for `task` steps
//! - `NotificationDispatcher` delivers rendered messages
//! - `ActionHandler`s, keyed by `actionType` in an `ActionRegistry`
//! - `Scheduler` and `Clock` for `delay` steps
//!
//! # Example
//!
//! ```ignore
//! use piano_flow::handlers::{ActionRegistry, Collaborators};
//!
//! let mut actions = ActionRegistry::with_builtins();
//! actions.register("update_piano_condition", MyPianoUpdater::new(api));
//!
//! let collaborators = Collaborators::tracing(NotificationAck::Sync).with_actions(actions);
//! ```

mod actions;
mod builtin;
mod types;

pub use actions::{ActionRegistry, SetFields};
pub use builtin::{ManualClock, PollingScheduler, SystemClock, TracingDispatcher, TracingTaskRunner};
pub use types::{
    ActionHandler, ActionRequest, Clock, Dispatch, HandlerError, Notification,
    NotificationDispatcher, Scheduler, TaskRequest, TaskRunner,
};

use crate::config::NotificationAck;
use std::sync::Arc;

/// The full set of collaborators a `StepExecutor` works against
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskRunner>,
    pub notifications: Arc<dyn NotificationDispatcher>,
    pub actions: ActionRegistry,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Log-only collaborators with the built-in actions
    pub fn tracing(ack: NotificationAck) -> Self {
        Self {
            tasks: Arc::new(TracingTaskRunner),
            notifications: Arc::new(TracingDispatcher::new(ack)),
            actions: ActionRegistry::with_builtins(),
            scheduler: Arc::new(PollingScheduler),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_tasks(mut self, tasks: impl TaskRunner + 'static) -> Self {
        self.tasks = Arc::new(tasks);
        self
    }

    pub fn with_notifications(mut self, dispatcher: impl NotificationDispatcher + 'static) -> Self {
        self.notifications = Arc::new(dispatcher);
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
