//! Template engine for rendering notification messages

use super::errors::TemplateError;
use super::filters;
use minijinja::Environment;
use serde_json::{Map, Value};

/// Template rendering engine
///
/// Wraps minijinja with custom filters and strict undefined handling, so a
/// message never goes out with a silently blank field.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new template engine with default configuration
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        filters::register_filters(&mut env);
        Self { env }
    }

    /// Render a template against a run's data record
    ///
    /// # Example
    ///
    /// ```ignore
    /// let engine = TemplateEngine::new();
    /// let data = json!({"client": "Ada"}).as_object().cloned().unwrap();
    ///
    /// let result = engine.render("Hello {{ client }}", &data)?;
    /// assert_eq!(result, "Hello Ada");
    /// ```
    pub fn render(&self, template: &str, data: &Map<String, Value>) -> Result<String, TemplateError> {
        self.env
            .render_str(template, data)
            .map_err(|e| convert_minijinja_error(e, data))
    }

    /// Render a template and return the result trimmed
    pub fn render_trimmed(
        &self,
        template: &str,
        data: &Map<String, Value>,
    ) -> Result<String, TemplateError> {
        self.render(template, data).map(|s| s.trim().to_string())
    }

    /// Check if a template is syntactically valid
    pub fn validate(&self, template: &str) -> Result<(), TemplateError> {
        let mut env = self.env.clone();
        env.add_template_owned("__validate__", template.to_string())
            .map_err(|e| TemplateError::syntax(e.to_string(), e.line().unwrap_or(0)))?;
        Ok(())
    }
}

/// Convert a minijinja error to our TemplateError type
fn convert_minijinja_error(err: minijinja::Error, data: &Map<String, Value>) -> TemplateError {
    let line = err.line().unwrap_or(0);

    match err.kind() {
        minijinja::ErrorKind::UndefinedError => {
            let known: Vec<&str> = data.keys().map(String::as_str).collect();
            let name = undefined_name(&err).unwrap_or_else(|| "unknown".to_string());
            TemplateError::undefined_field(name, line, &known)
        }
        minijinja::ErrorKind::InvalidOperation => TemplateError::filter(err.to_string()),
        minijinja::ErrorKind::SyntaxError => TemplateError::syntax(err.to_string(), line),
        _ => TemplateError::Internal(err),
    }
}

/// Pull the offending expression out of the error's source span
fn undefined_name(err: &minijinja::Error) -> Option<String> {
    let source = err.template_source()?;
    let span = err.range()?;
    source
        .get(span)
        .map(|expr| expr.trim().to_string())
        .filter(|expr| !expr.is_empty())
}
