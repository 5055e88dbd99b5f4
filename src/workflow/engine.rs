//! Workflow engine - publishes definitions and drives runs across suspensions

use super::context::{ExecutionContext, ExecutionStatus};
use super::error::{ErrorKind, FailureRecord};
use super::executor::{ResumeSignal, StepExecutor, StepOutcome};
use super::validator::validate;
use crate::config::{Defaults, EngineConfig, WorkflowDefinition, WorkflowStep};
use crate::handlers::Collaborators;
use crate::store::Persistence;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors returned to engine callers
///
/// Step failures are not among them: those end up on the context.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow '{id}' is invalid: {}", .errors.join("; "))]
    DefinitionInvalid { id: String, errors: Vec<String> },

    #[error("workflow '{id}' not found")]
    WorkflowNotFound { id: String },

    #[error("execution context '{id}' not found")]
    ContextNotFound { id: String },

    #[error("execution context '{id}' is {status}, not paused")]
    NotResumable { id: String, status: ExecutionStatus },

    #[error("execution context '{id}' already {status}")]
    AlreadyFinished { id: String, status: ExecutionStatus },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Result of delivering a signal to a paused run
enum Resumed {
    /// The signal was applied and the run driven onward
    Advanced(ExecutionContext),
    /// The delay deadline has not passed; nothing changed
    NotYetDue(ExecutionContext),
}

impl Resumed {
    fn into_context(self) -> ExecutionContext {
        match self {
            Resumed::Advanced(ctx) | Resumed::NotYetDue(ctx) => ctx,
        }
    }
}

/// Orchestrates validation, triggering and resumption of runs
pub struct WorkflowEngine {
    store: Arc<dyn Persistence>,
    executor: StepExecutor,
    max_transitions: u32,
    /// One async lock per context id with a caller in flight
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Persistence>, collaborators: Collaborators) -> Self {
        Self {
            store,
            executor: StepExecutor::new(collaborators),
            max_transitions: Defaults::default().max_transitions,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        store: Arc<dyn Persistence>,
        collaborators: Collaborators,
    ) -> Self {
        Self::new(store, collaborators).with_max_transitions(config.defaults.max_transitions)
    }

    /// Cap on step executions per drive
    pub fn with_max_transitions(mut self, limit: u32) -> Self {
        self.max_transitions = limit;
        self
    }

    pub fn store(&self) -> &dyn Persistence {
        self.store.as_ref()
    }

    /// Validate and activate a definition
    ///
    /// An invalid definition is neither stored nor activated; the error
    /// carries every validation message, followed by any notification
    /// template that fails to parse.
    pub fn publish(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, EngineError> {
        let mut errors = validate(&definition).errors;
        errors.extend(self.executor.check_templates(&definition));
        if !errors.is_empty() {
            tracing::warn!(
                workflow = %definition.id,
                errors = errors.len(),
                "Refusing to publish invalid workflow"
            );
            return Err(EngineError::DefinitionInvalid {
                id: definition.id,
                errors,
            });
        }

        definition.is_active = true;
        self.store.save_definition(&definition)?;

        tracing::info!(
            workflow = %definition.id,
            trigger = %definition.trigger,
            steps = definition.steps.len(),
            "Workflow published"
        );
        Ok(definition)
    }

    /// Start a run of `definition`
    ///
    /// Returns `None` without touching the store when the definition is
    /// inactive. Otherwise drives the run until it suspends or finishes.
    pub async fn trigger(
        &self,
        definition: &WorkflowDefinition,
        triggered_by: &str,
        data: Map<String, Value>,
    ) -> Result<Option<ExecutionContext>, EngineError> {
        if !definition.is_active {
            tracing::debug!(workflow = %definition.id, "Ignoring trigger for inactive workflow");
            return Ok(None);
        }

        let ctx = ExecutionContext::new(&definition.id, triggered_by, data);
        let id = ctx.id.clone();
        self.serialized(&id, self.start(definition, ctx))
            .await
            .map(Some)
    }

    /// Start a run of a stored definition by id
    pub async fn trigger_by_id(
        &self,
        workflow_id: &str,
        triggered_by: &str,
        data: Map<String, Value>,
    ) -> Result<Option<ExecutionContext>, EngineError> {
        let definition = self.definition(workflow_id)?;
        self.trigger(&definition, triggered_by, data).await
    }

    /// Fan a business event out to every active definition listening on it
    pub async fn trigger_event(
        &self,
        event: &str,
        triggered_by: &str,
        data: Map<String, Value>,
    ) -> Result<Vec<ExecutionContext>, EngineError> {
        let definitions = self.store.active_for_trigger(event)?;
        tracing::debug!(event, subscribers = definitions.len(), "Dispatching event");

        let mut started = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            if let Some(ctx) = self.trigger(definition, triggered_by, data.clone()).await? {
                started.push(ctx);
            }
        }
        Ok(started)
    }

    /// Deliver an external signal to a paused run and keep driving it
    ///
    /// A delay signalled before its deadline is returned unchanged.
    pub async fn resume(
        &self,
        context_id: &str,
        signal: ResumeSignal,
    ) -> Result<ExecutionContext, EngineError> {
        self.serialized(context_id, self.resume_locked(context_id, signal))
            .await
            .map(Resumed::into_context)
    }

    /// Fail a running or paused run with reason `cancelled`
    ///
    /// Waits for any in-flight drive of the same run, so it lands on a
    /// suspension boundary.
    pub async fn cancel(&self, context_id: &str) -> Result<ExecutionContext, EngineError> {
        self.serialized(context_id, async {
            let mut ctx = self.context(context_id)?;
            if ctx.status.is_terminal() {
                return Err(EngineError::AlreadyFinished {
                    id: ctx.id,
                    status: ctx.status,
                });
            }

            let mut record = FailureRecord::cancelled(ctx.current_step.clone());
            if let Some(step_type) = self.step_type(&ctx.workflow_id, &ctx.current_step)? {
                record = record.with_step_type(step_type);
            }
            ctx.mark_failed(record);
            self.store.save_context(&ctx)?;

            tracing::info!(context_id = %ctx.id, step = %ctx.current_step, "Run cancelled");
            Ok(ctx)
        })
        .await
    }

    /// Resume every paused delay whose deadline has passed
    ///
    /// Only runs that actually moved past their delay are returned.
    pub async fn resume_due(&self) -> Result<Vec<ExecutionContext>, EngineError> {
        let now = self.executor.clock().now();
        let due = self.store.due_delays(now)?;

        let mut resumed = Vec::with_capacity(due.len());
        for id in due {
            let outcome = self
                .serialized(&id, self.resume_locked(&id, ResumeSignal::completed()))
                .await;
            match outcome {
                Ok(Resumed::Advanced(ctx)) => resumed.push(ctx),
                Ok(Resumed::NotYetDue(_)) => {
                    tracing::debug!(context_id = %id, "Delay not yet due, skipped");
                }
                Err(EngineError::NotResumable { .. }) => {
                    tracing::debug!(context_id = %id, "Delay already resumed elsewhere");
                }
                Err(e) => {
                    tracing::warn!(context_id = %id, error = %e, "Failed to resume delayed run");
                }
            }
        }
        Ok(resumed)
    }

    pub fn definition(&self, workflow_id: &str) -> Result<WorkflowDefinition, EngineError> {
        self.store
            .load_definition(workflow_id)?
            .ok_or_else(|| EngineError::WorkflowNotFound {
                id: workflow_id.to_string(),
            })
    }

    pub fn context(&self, context_id: &str) -> Result<ExecutionContext, EngineError> {
        self.store
            .load_context(context_id)?
            .ok_or_else(|| EngineError::ContextNotFound {
                id: context_id.to_string(),
            })
    }

    fn step_type(&self, workflow_id: &str, step_id: &str) -> Result<Option<String>, EngineError> {
        let definition = self.store.load_definition(workflow_id)?;
        Ok(definition
            .as_ref()
            .and_then(|d| d.step(step_id))
            .map(|step| step.kind.type_name().to_string()))
    }

    async fn start(
        &self,
        definition: &WorkflowDefinition,
        mut ctx: ExecutionContext,
    ) -> Result<ExecutionContext, EngineError> {
        tracing::info!(
            workflow = %definition.id,
            context_id = %ctx.id,
            triggered_by = %ctx.triggered_by,
            "Workflow triggered"
        );

        match definition.entry_step_id() {
            Some(entry) => ctx.advance_to(entry),
            None => ctx.mark_completed(),
        }
        self.store.save_context(&ctx)?;

        self.drive(definition, &mut ctx).await?;
        Ok(ctx)
    }

    async fn resume_locked(
        &self,
        context_id: &str,
        signal: ResumeSignal,
    ) -> Result<Resumed, EngineError> {
        let mut ctx = self.context(context_id)?;
        if ctx.status != ExecutionStatus::Paused {
            return Err(EngineError::NotResumable {
                id: ctx.id,
                status: ctx.status,
            });
        }

        if let (Some(resume_at), ResumeSignal::Completed { .. }) = (ctx.resume_at(), &signal) {
            if self.executor.clock().now() < resume_at {
                tracing::debug!(context_id, %resume_at, "Delay not yet due");
                return Ok(Resumed::NotYetDue(ctx));
            }
        }

        let definition = self.definition(&ctx.workflow_id)?;
        let Some(step) = definition.step(&ctx.current_step) else {
            let kind = ErrorKind::UnresolvedBranch {
                step: ctx.current_step.clone(),
            };
            self.fail(&mut ctx, kind, None)?;
            return Ok(Resumed::Advanced(ctx));
        };

        tracing::info!(context_id, step = %step.id, "Resuming run");

        ctx.mark_running();
        let outcome = self.executor.acknowledge(step, &mut ctx, signal);
        self.apply(&mut ctx, outcome);
        self.store.save_context(&ctx)?;

        self.drive(&definition, &mut ctx).await?;
        Ok(Resumed::Advanced(ctx))
    }

    /// Execute steps until the run leaves `Running`
    ///
    /// The context is saved after every step, so a suspended run is always
    /// durable before control returns to the caller.
    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut ExecutionContext,
    ) -> Result<(), EngineError> {
        let mut executed = 0u32;

        while ctx.status == ExecutionStatus::Running {
            let Some(step) = definition.step(&ctx.current_step) else {
                let kind = ErrorKind::UnresolvedBranch {
                    step: ctx.current_step.clone(),
                };
                // Blame the step that branched to the missing id
                let origin = ctx
                    .completed_steps
                    .last()
                    .and_then(|id| definition.step(id));
                return self.fail(ctx, kind, origin);
            };

            if executed >= self.max_transitions {
                let kind = ErrorKind::TransitionLimit {
                    limit: self.max_transitions,
                };
                return self.fail(ctx, kind, Some(step));
            }

            let outcome = self.executor.execute(step, ctx).await;
            executed += 1;
            ctx.transitions += 1;

            self.apply(ctx, outcome);
            self.store.save_context(ctx)?;
        }

        Ok(())
    }

    fn apply(&self, ctx: &mut ExecutionContext, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Advance(next) => ctx.advance_to(next),
            StepOutcome::Suspend(awaiting) => {
                tracing::info!(
                    context_id = %ctx.id,
                    step = %ctx.current_step,
                    ?awaiting,
                    "Run suspended"
                );
                ctx.mark_paused(awaiting);
            }
            StepOutcome::Complete => {
                ctx.mark_completed();
                tracing::info!(
                    context_id = %ctx.id,
                    steps = ctx.completed_steps.len(),
                    "Run completed"
                );
            }
            StepOutcome::Fail(err) => {
                tracing::warn!(
                    context_id = %ctx.id,
                    step = %err.step,
                    duration_ms = err.duration_ms,
                    error = %err,
                    "Run failed"
                );
                ctx.mark_failed(FailureRecord::from(&err));
            }
        }
    }

    /// Fail the run outside any step handler and persist it
    ///
    /// The record names `origin` when there is one, otherwise the current
    /// step id with no type.
    fn fail(
        &self,
        ctx: &mut ExecutionContext,
        kind: ErrorKind,
        origin: Option<&WorkflowStep>,
    ) -> Result<(), EngineError> {
        tracing::warn!(context_id = %ctx.id, step = %ctx.current_step, error = %kind, "Run failed");

        let record = match origin {
            Some(step) => {
                FailureRecord::engine(&step.id, &kind).with_step_type(step.kind.type_name())
            }
            None => FailureRecord::engine(ctx.current_step.clone(), &kind),
        };
        ctx.mark_failed(record);
        self.store.save_context(ctx)?;
        Ok(())
    }

    /// Run `work` holding the lock for `context_id`
    async fn serialized<T>(&self, context_id: &str, work: impl Future<Output = T>) -> T {
        let lock = self.context_lock(context_id);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.release(context_id);
        result
    }

    fn context_lock(&self, context_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(context_id.to_string()).or_default().clone()
    }

    /// Drop the lock entry once no caller holds a handle to it
    fn release(&self, context_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(context_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(context_id);
        }
    }
}
