//! Configuration loading with multi-layer merge

use super::WorkflowDefinition;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the default notification dispatcher reports delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAck {
    /// Delivery is confirmed in the same call
    #[default]
    Sync,
    /// Delivery is confirmed later through `resume`
    Async,
}

/// Global default settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Max step executions in one drive of a run
    #[serde(default = "default_max_transitions")]
    pub max_transitions: u32,

    #[serde(default)]
    pub notification_ack: NotificationAck,
}

fn default_max_transitions() -> u32 {
    1000
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_transitions: default_max_transitions(),
            notification_ack: NotificationAck::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database path; `~` and `$VARS` are expanded
    pub path: Option<String>,
}

impl StoreConfig {
    /// Resolve the database path, falling back to the user data dir
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(ref raw) = self.path {
            let expanded = shellexpand::full(raw)
                .with_context(|| format!("expanding store path '{}'", raw))?;
            return Ok(PathBuf::from(expanded.as_ref()));
        }

        let data_dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(data_dir.join("piano-flow").join("engine.db"))
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Also write logs to this file
    pub file: Option<String>,

    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive, e.g. `piano_flow=debug`
    pub level: Option<String>,
}

impl EngineConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/piano-flow/config.toml
    /// 3. .piano-flow/config.toml (project)
    /// 4. An explicit file, if given
    pub fn load(project_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".piano-flow/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".piano-flow/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        if let Some(path) = explicit {
            let explicit_config =
                Self::load_file(path).with_context(|| format!("loading {}", path.display()))?;
            config.merge(explicit_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/piano-flow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("piano-flow/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.max_transitions != default_max_transitions() {
            self.defaults.max_transitions = other.defaults.max_transitions;
        }
        if other.defaults.notification_ack != NotificationAck::default() {
            self.defaults.notification_ack = other.defaults.notification_ack;
        }

        if other.store.path.is_some() {
            self.store.path = other.store.path;
        }

        if other.logging.file.is_some() {
            self.logging.file = other.logging.file;
        }
        if other.logging.format != LogFormat::default() {
            self.logging.format = other.logging.format;
        }
        if other.logging.level.is_some() {
            self.logging.level = other.logging.level;
        }
    }
}

/// Load a workflow definition from a `.toml` or `.json` file
///
/// Only parses; structural validation happens at publish time.
pub fn load_definition_file(path: &Path) -> Result<WorkflowDefinition> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let definition: WorkflowDefinition = if is_json {
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    } else {
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    };

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.defaults.max_transitions, 1000);
        assert_eq!(config.defaults.notification_ack, NotificationAck::Sync);
        assert!(config.store.path.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [defaults]
            max_transitions = 50
            notification_ack = "async"

            [store]
            path = "/var/lib/piano-flow/engine.db"

            [logging]
            format = "json"
        "#
        )
        .unwrap();

        let config = EngineConfig::load_file(&config_path).unwrap();
        assert_eq!(config.defaults.max_transitions, 50);
        assert_eq!(config.defaults.notification_ack, NotificationAck::Async);
        assert_eq!(
            config.store.resolve_path().unwrap(),
            PathBuf::from("/var/lib/piano-flow/engine.db")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<EngineConfig, _> = toml::from_str("[defaults]\nretries = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = EngineConfig::default();
        base.store.path = Some("/tmp/base.db".into());
        base.logging.level = Some("piano_flow=info".into());

        let mut override_config = EngineConfig::default();
        override_config.defaults.max_transitions = 10;
        override_config.store.path = Some("/tmp/project.db".into());

        base.merge(override_config);

        assert_eq!(base.defaults.max_transitions, 10);
        assert_eq!(base.store.path.as_deref(), Some("/tmp/project.db"));
        // untouched keys survive
        assert_eq!(base.logging.level.as_deref(), Some("piano_flow=info"));
    }

    #[test]
    fn test_project_layer_loaded() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".piano-flow")).unwrap();
        std::fs::write(
            dir.path().join(".piano-flow/config.toml"),
            "[store]\npath = \"/srv/flows.db\"\n",
        )
        .unwrap();

        let config = EngineConfig::load(Some(dir.path()), None).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/srv/flows.db"));
    }

    #[test]
    fn test_load_definition_json_and_toml() {
        let dir = TempDir::new().unwrap();

        let json_path = dir.path().join("flow.json");
        std::fs::write(
            &json_path,
            r#"{
                "id": "wf-1",
                "name": "Test",
                "trigger": "t",
                "isActive": true,
                "steps": [
                    {"id": "s1", "type": "task", "name": "First Step", "config": {}},
                    {"id": "s2", "type": "notification", "name": "Notify", "config": {}, "nextSteps": []}
                ]
            }"#,
        )
        .unwrap();
        let definition = load_definition_file(&json_path).unwrap();
        assert_eq!(definition.name, "Test");
        assert!(definition.is_active);
        assert_eq!(definition.steps.len(), 2);

        let toml_path = dir.path().join("flow.toml");
        std::fs::write(
            &toml_path,
            r#"
            id = "wf-2"
            name = "Other"
            trigger = "invoice_overdue"

            [[steps]]
            id = "only"
            type = "action"
            name = "Flag"
            config = { actionType = "set_fields", params = { flagged = true } }
            "#,
        )
        .unwrap();
        let definition = load_definition_file(&toml_path).unwrap();
        assert_eq!(definition.trigger, "invoice_overdue");
    }
}
