//! Typed task/step DAG definitions.
//!
//! Templates are loaded once at startup into an immutable structure and
//! describe the DAG shape, retry policy, and handler binding for each step.
//! Handler bindings are names resolved through the
//! [`StepHandlerRegistry`](crate::registry::StepHandlerRegistry); the engine
//! never resolves handlers by reflection or dynamic loading.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::constants::system::{MAX_DEPENDENCY_DEPTH, MAX_WORKFLOW_STEPS};

/// Default retry limit applied when a step template does not set one
pub const DEFAULT_RETRY_LIMIT: i32 = 3;

/// Template for one workflow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,
    /// Registry key of the handler that executes this step
    pub handler_name: String,
    /// Names of steps this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub retry_limit: Option<i32>,
    #[serde(default = "default_retryable")]
    pub retryable: bool,
    /// Per-step handler timeout override, seconds
    pub timeout_seconds: Option<u64>,
    /// Static inputs handed to the handler on every attempt
    pub inputs: Option<Value>,
}

fn default_retryable() -> bool {
    true
}

impl StepTemplate {
    pub fn new(name: impl Into<String>, handler_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler_name: handler_name.into(),
            depends_on: Vec::new(),
            retry_limit: None,
            retryable: true,
            timeout_seconds: None,
            inputs: None,
        }
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: i32) -> Self {
        self.retry_limit = Some(retry_limit);
        self
    }

    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }
}

/// Immutable DAG definition for a named task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub steps: Vec<StepTemplate>,
}

/// Template validation failures
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{template}' has no steps")]
    Empty { template: String },

    #[error("template '{template}' exceeds the {max} step limit ({count} steps)")]
    TooManySteps {
        template: String,
        count: usize,
        max: usize,
    },

    #[error("duplicate step name '{step}' in template '{template}'")]
    DuplicateStep { template: String, step: String },

    #[error("step '{step}' in template '{template}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        template: String,
        step: String,
        dependency: String,
    },

    #[error("template '{template}' contains a dependency cycle involving '{step}'")]
    DependencyCycle { template: String, step: String },

    #[error("template '{template}' exceeds the maximum dependency depth of {max}")]
    TooDeep { template: String, max: usize },
}

impl TaskTemplate {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        version: impl Into<String>,
        steps: Vec<StepTemplate>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: version.into(),
            steps,
        }
    }

    /// Composite registry key: `namespace/name/version`
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.version)
    }

    pub fn step(&self, name: &str) -> Option<&StepTemplate> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Validate the DAG shape: non-empty, within the step cap, unique step
    /// names, known dependencies, acyclic, and within the depth limit.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.steps.is_empty() {
            return Err(TemplateError::Empty {
                template: self.key(),
            });
        }
        if self.steps.len() > MAX_WORKFLOW_STEPS {
            return Err(TemplateError::TooManySteps {
                template: self.key(),
                count: self.steps.len(),
                max: MAX_WORKFLOW_STEPS,
            });
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(TemplateError::DuplicateStep {
                    template: self.key(),
                    step: step.name.clone(),
                });
            }
        }

        for step in &self.steps {
            for dependency in &step.depends_on {
                if !names.contains(dependency.as_str()) {
                    return Err(TemplateError::UnknownDependency {
                        template: self.key(),
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        self.check_acyclic_and_depth()?;
        Ok(())
    }

    /// Kahn's algorithm; also yields the longest-path depth for the limit check
    fn check_acyclic_and_depth(&self) -> Result<(), TemplateError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

        for step in &self.steps {
            in_degree.entry(step.name.as_str()).or_insert(0);
            for dependency in &step.depends_on {
                *in_degree.entry(step.name.as_str()).or_insert(0) += 1;
                children
                    .entry(dependency.as_str())
                    .or_default()
                    .push(step.name.as_str());
            }
        }

        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(name, _)| *name)
            .collect();
        for name in &queue {
            depth.insert(name, 1);
        }

        let mut visited = 0usize;
        while let Some(name) = queue.pop_front() {
            visited += 1;
            let current_depth = depth[name];
            if current_depth > MAX_DEPENDENCY_DEPTH {
                return Err(TemplateError::TooDeep {
                    template: self.key(),
                    max: MAX_DEPENDENCY_DEPTH,
                });
            }
            for child in children.get(name).map(|c| c.as_slice()).unwrap_or(&[]) {
                let entry = depth.entry(child).or_insert(0);
                *entry = (*entry).max(current_depth + 1);
                if let Some(d) = in_degree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if visited != self.steps.len() {
            let stuck = in_degree
                .iter()
                .find(|(_, d)| **d > 0)
                .map(|(name, _)| name.to_string())
                .unwrap_or_default();
            return Err(TemplateError::DependencyCycle {
                template: self.key(),
                step: stuck,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_template() -> TaskTemplate {
        TaskTemplate::new(
            "etl",
            "data",
            "1.0.0",
            vec![
                StepTemplate::new("extract", "extract_handler"),
                StepTemplate::new("transform", "transform_handler").depends_on(&["extract"]),
                StepTemplate::new("load", "load_handler").depends_on(&["transform"]),
            ],
        )
    }

    #[test]
    fn valid_template_passes() {
        assert!(linear_template().validate().is_ok());
    }

    #[test]
    fn duplicate_step_rejected() {
        let template = TaskTemplate::new(
            "etl",
            "data",
            "1.0.0",
            vec![
                StepTemplate::new("extract", "a"),
                StepTemplate::new("extract", "b"),
            ],
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateError::DuplicateStep { .. })
        ));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let template = TaskTemplate::new(
            "etl",
            "data",
            "1.0.0",
            vec![StepTemplate::new("load", "load_handler").depends_on(&["missing"])],
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycle_rejected() {
        let template = TaskTemplate::new(
            "etl",
            "data",
            "1.0.0",
            vec![
                StepTemplate::new("a", "h").depends_on(&["b"]),
                StepTemplate::new("b", "h").depends_on(&["a"]),
            ],
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn empty_template_rejected() {
        let template = TaskTemplate::new("etl", "data", "1.0.0", vec![]);
        assert!(matches!(
            template.validate(),
            Err(TemplateError::Empty { .. })
        ));
    }
}
