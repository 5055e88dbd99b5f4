//! Workflow definition and step configuration

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Step type - the closed set of kinds a step can be
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Unit of work acknowledged by the task runner
    Task,
    /// Rendered message handed to the notification dispatcher
    Notification,
    /// Two-way branch on a `Condition`
    Condition,
    /// Wall-clock pause
    Delay,
    /// Side-effecting handler that may patch the run data
    Action,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Task => "task",
            StepType::Notification => "notification",
            StepType::Condition => "condition",
            StepType::Delay => "delay",
            StepType::Action => "action",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator used by a `Condition`
///
/// Unrecognized operator names are kept verbatim so that a stored
/// definition still loads; they evaluate to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    Other(String),
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "equals" => Self::Equals,
            "not_equals" => Self::NotEquals,
            "greater_than" => Self::GreaterThan,
            "less_than" => Self::LessThan,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            _ => Self::Other(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Equals => "equals".into(),
            Operator::NotEquals => "not_equals".into(),
            Operator::GreaterThan => "greater_than".into(),
            Operator::LessThan => "less_than".into(),
            Operator::Contains => "contains".into(),
            Operator::NotContains => "not_contains".into(),
            Operator::Other(s) => s,
        }
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// A single typed predicate over the run data
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Condition {
    /// Key read from the data record
    #[serde(default)]
    pub field: String,

    #[serde(default)]
    pub operator: Operator,

    /// Comparison operand; `None` stands for an undefined operand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value.into()),
        }
    }
}

/// Config for task steps
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<String>,
}

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Email,
    Push,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => f.write_str("email"),
            Channel::Push => f.write_str("push"),
            Channel::Sms => f.write_str("sms"),
        }
    }
}

/// Config for notification steps
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Message body template, rendered against the run data
    #[serde(default)]
    pub template: String,

    /// Recipient template (address, device token, phone number)
    #[serde(default)]
    pub recipient: String,

    #[serde(default)]
    pub channel: Channel,

    pub subject: Option<String>,
}

/// Unit for structured delay durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// Delay duration, either `{ amount, unit }` or a compact string like `"3d"`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DelaySpec {
    Structured { amount: u64, unit: DelayUnit },
    Compact(String),
}

static COMPACT_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*([smhdw])\s*$").expect("duration pattern is valid")
});

impl DelaySpec {
    /// Resolve to a concrete duration; `None` if the spec is malformed
    pub fn to_duration(&self) -> Option<chrono::TimeDelta> {
        let (amount, unit) = match self {
            DelaySpec::Structured { amount, unit } => (*amount, *unit),
            DelaySpec::Compact(s) => {
                let caps = COMPACT_DURATION.captures(s)?;
                let amount: u64 = caps[1].parse().ok()?;
                let unit = match &caps[2] {
                    "s" => DelayUnit::Seconds,
                    "m" => DelayUnit::Minutes,
                    "h" => DelayUnit::Hours,
                    "d" => DelayUnit::Days,
                    _ => DelayUnit::Weeks,
                };
                (amount, unit)
            }
        };

        let amount = i64::try_from(amount).ok()?;
        match unit {
            DelayUnit::Seconds => chrono::TimeDelta::try_seconds(amount),
            DelayUnit::Minutes => chrono::TimeDelta::try_minutes(amount),
            DelayUnit::Hours => chrono::TimeDelta::try_hours(amount),
            DelayUnit::Days => chrono::TimeDelta::try_days(amount),
            DelayUnit::Weeks => chrono::TimeDelta::try_weeks(amount),
        }
    }
}

/// Config for delay steps
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    pub duration: Option<DelaySpec>,
}

/// Config for action steps
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ActionConfig {
    /// Key into the action handler registry
    #[serde(default)]
    pub action_type: String,

    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Typed step payload, keyed by step type
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Task(TaskConfig),
    Notification(NotificationConfig),
    Condition(Condition),
    Delay(DelayConfig),
    Action(ActionConfig),
    /// A `type` outside the known set, kept so the run can fail cleanly
    Unknown { type_name: String, config: Value },
}

impl StepKind {
    /// Step type, or `None` for unknown kinds
    pub fn step_type(&self) -> Option<StepType> {
        match self {
            StepKind::Task(_) => Some(StepType::Task),
            StepKind::Notification(_) => Some(StepType::Notification),
            StepKind::Condition(_) => Some(StepType::Condition),
            StepKind::Delay(_) => Some(StepType::Delay),
            StepKind::Action(_) => Some(StepType::Action),
            StepKind::Unknown { .. } => None,
        }
    }

    /// Type name as written in the definition
    pub fn type_name(&self) -> &str {
        match self {
            StepKind::Unknown { type_name, .. } => type_name,
            other => other.step_type().map(|t| t.as_str()).unwrap_or_default(),
        }
    }
}

/// A node in the step graph
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct WorkflowStep {
    /// Unique within the owning definition
    pub id: String,

    pub name: String,

    pub kind: StepKind,

    /// Successor ids; condition steps read this as `[on_true, on_false]`
    pub next_steps: Vec<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            next_steps: Vec::new(),
        }
    }

    /// Set the successor list
    pub fn then<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_steps = next.into_iter().map(Into::into).collect();
        self
    }

    /// Successor in slot `idx`, if present and non-empty
    pub fn successor(&self, idx: usize) -> Option<&str> {
        self.next_steps
            .get(idx)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Wire shape of a step: `{ id, type, name, config, nextSteps }`
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    id: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    next_steps: Vec<String>,
}

impl TryFrom<RawStep> for WorkflowStep {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let config = match raw.config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        fn parse<T: serde::de::DeserializeOwned>(
            step: &str,
            config: Value,
        ) -> Result<T, String> {
            serde_json::from_value(config)
                .map_err(|e| format!("invalid config for step '{}': {}", step, e))
        }

        let kind = match raw.step_type.as_str() {
            "task" => StepKind::Task(parse(&raw.id, config)?),
            "notification" => StepKind::Notification(parse(&raw.id, config)?),
            "condition" => StepKind::Condition(parse(&raw.id, config)?),
            "delay" => StepKind::Delay(parse(&raw.id, config)?),
            "action" => StepKind::Action(parse(&raw.id, config)?),
            _ => StepKind::Unknown {
                type_name: raw.step_type,
                config,
            },
        };

        Ok(Self {
            id: raw.id,
            name: raw.name,
            kind,
            next_steps: raw.next_steps,
        })
    }
}

impl From<WorkflowStep> for RawStep {
    fn from(step: WorkflowStep) -> Self {
        let step_type = step.kind.type_name().to_string();
        let config = match step.kind {
            StepKind::Task(c) => serde_json::to_value(c),
            StepKind::Notification(c) => serde_json::to_value(c),
            StepKind::Condition(c) => serde_json::to_value(c),
            StepKind::Delay(c) => serde_json::to_value(c),
            StepKind::Action(c) => serde_json::to_value(c),
            StepKind::Unknown { config, .. } => Ok(config),
        }
        .unwrap_or(Value::Null);

        Self {
            id: step.id,
            step_type,
            name: step.name,
            config,
            next_steps: step.next_steps,
        }
    }
}

fn default_version() -> u32 {
    1
}

/// User-authored automation blueprint: a trigger plus a step graph
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Opaque identifier, immutable once published
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: u32,

    /// Business event that starts a run
    pub trigger: String,

    /// Declaration order is advisory; flow order comes from `next_steps`
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub is_active: bool,

    /// Explicit first step; see `entry_step_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_step: Option<String>,
}

impl WorkflowDefinition {
    /// Look up a step by id (first match in declaration order)
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// First step to execute on trigger
    ///
    /// Resolution order: explicit `entry_step`, then the unique step with no
    /// incoming edges, then `steps[0]`.
    pub fn entry_step_id(&self) -> Option<&str> {
        if let Some(ref entry) = self.entry_step {
            return Some(entry.as_str());
        }

        let targets: HashSet<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.next_steps.iter().map(String::as_str))
            .collect();

        let mut roots = self.steps.iter().filter(|s| !targets.contains(s.id.as_str()));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root.id.as_str()),
            _ => self.steps.first().map(|s| s.id.as_str()),
        }
    }
}
