//! Configuration types and loading for piano-flow

mod loader;
mod workflow;

pub use loader::{
    Defaults, EngineConfig, LogFormat, LoggingConfig, NotificationAck, StoreConfig,
    load_definition_file,
};
pub use workflow::{
    ActionConfig, Channel, Condition, DelayConfig, DelaySpec, DelayUnit, NotificationConfig,
    Operator, StepKind, StepType, TaskConfig, WorkflowDefinition, WorkflowStep,
};
