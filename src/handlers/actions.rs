//! Action handler registry

use super::types::{ActionHandler, ActionRequest, HandlerError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Action handlers keyed by `actionType`
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("set_fields", SetFields);
        registry
    }

    /// Register a handler, replacing any previous one for the key
    pub fn register(&mut self, action_type: impl Into<String>, handler: impl ActionHandler + 'static) {
        self.handlers.insert(action_type.into(), Arc::new(handler));
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// Run the handler registered for `action_type`
    pub async fn invoke(
        &self,
        action_type: &str,
        request: &ActionRequest,
    ) -> Result<Map<String, Value>, HandlerError> {
        let Some(handler) = self.get(action_type) else {
            tracing::debug!(action_type, registered = ?self.action_types(), "No action handler");
            return Err(HandlerError::unknown_action(action_type));
        };
        handler.run(request).await
    }

    pub fn action_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Returns its params unchanged as the patch
///
/// Covers the common "update piano condition to X" style actions.
pub struct SetFields;

#[async_trait]
impl ActionHandler for SetFields {
    async fn run(&self, request: &ActionRequest) -> Result<Map<String, Value>, HandlerError> {
        if request.params.is_empty() {
            return Err(HandlerError::rejected("set_fields needs at least one param"));
        }
        Ok(request.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(params: Value) -> ActionRequest {
        ActionRequest {
            context_id: "ctx".into(),
            step_id: "act".into(),
            params: params.as_object().cloned().unwrap(),
            data: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_set_fields() {
        let registry = ActionRegistry::with_builtins();
        let patch = registry
            .invoke("set_fields", &request(json!({"pianoCondition": "good"})))
            .await
            .unwrap();
        assert_eq!(patch["pianoCondition"], "good");
    }

    #[tokio::test]
    async fn test_set_fields_rejects_empty() {
        let registry = ActionRegistry::with_builtins();
        let result = registry.invoke("set_fields", &request(json!({}))).await;
        assert!(matches!(result, Err(HandlerError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let registry = ActionRegistry::new();
        let result = registry.invoke("missing", &request(json!({}))).await;
        assert!(matches!(result, Err(HandlerError::UnknownAction { .. })));
    }

    #[test]
    fn test_action_types_sorted() {
        let mut registry = ActionRegistry::with_builtins();
        registry.register("archive_invoice", SetFields);
        assert_eq!(registry.action_types(), vec!["archive_invoice", "set_fields"]);
    }
}
