//! # Handler Registry
//!
//! Explicitly constructed, dependency-injected lookup from handler binding
//! names to [`StepHandler`] implementations and from template keys to
//! [`TaskTemplate`]s. Built once by application wiring at startup and
//! passed by reference to the components that need lookup; there is no
//! process-global registry state.

use dashmap::DashMap;
use std::sync::Arc;

use crate::handler::StepHandler;
use crate::models::TaskTemplate;

/// Registry lookup failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no step handler registered under '{0}'")]
    HandlerNotFound(String),

    #[error("no task template registered under '{0}'")]
    TemplateNotFound(String),
}

/// Thread-safe step handler and template registry
#[derive(Default)]
pub struct StepHandlerRegistry {
    handlers: DashMap<String, Arc<dyn StepHandler>>,
    templates: DashMap<String, Arc<TaskTemplate>>,
}

impl StepHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its binding name, replacing any previous
    /// registration for the same name.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        let name = name.into();
        tracing::debug!(handler = %name, "Registering step handler");
        self.handlers.insert(name, handler);
    }

    /// Resolve a handler by binding name
    pub fn resolve_handler(&self, name: &str) -> Result<Arc<dyn StepHandler>, RegistryError> {
        self.handlers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::HandlerNotFound(name.to_string()))
    }

    /// Register a task template under its `namespace/name/version` key
    pub fn register_template(&self, template: TaskTemplate) {
        let key = template.key();
        tracing::debug!(template = %key, steps = template.steps.len(), "Registering task template");
        self.templates.insert(key, Arc::new(template));
    }

    /// Resolve a template by namespace, name, and version
    pub fn resolve_template(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> Result<Arc<TaskTemplate>, RegistryError> {
        let key = format!("{namespace}/{name}/{version}");
        self.templates
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::TemplateNotFound(key))
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{StepContext, StepHandlerError};
    use crate::models::StepTemplate;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopHandler;

    #[async_trait]
    impl StepHandler for NoopHandler {
        async fn process(&self, _context: &StepContext) -> Result<Value, StepHandlerError> {
            Ok(serde_json::json!({}))
        }
    }

    #[test]
    fn handler_registration_and_lookup() {
        let registry = StepHandlerRegistry::new();
        registry.register_handler("noop", Arc::new(NoopHandler));

        assert!(registry.resolve_handler("noop").is_ok());
        assert!(matches!(
            registry.resolve_handler("missing"),
            Err(RegistryError::HandlerNotFound(_))
        ));
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn template_registration_and_lookup() {
        let registry = StepHandlerRegistry::new();
        registry.register_template(TaskTemplate::new(
            "etl",
            "data",
            "1.0.0",
            vec![StepTemplate::new("extract", "noop")],
        ));

        assert!(registry.resolve_template("data", "etl", "1.0.0").is_ok());
        assert!(registry.resolve_template("data", "etl", "2.0.0").is_err());
    }
}
