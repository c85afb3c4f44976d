//! # Task Initializer
//!
//! Creates a task with its workflow steps and dependency edges from a
//! validated [`TaskTemplate`]. Created entities start in their default
//! `pending` state (an empty transition log); the first processing pass
//! applies the `start` transition.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::constants::events;
use crate::events::{EventPublisher, PublishError};
use crate::models::{
    NewTask, NewWorkflowStep, NewWorkflowStepEdge, Task, TaskRequest, TaskTemplate, TemplateError,
    DEFAULT_RETRY_LIMIT,
};
use crate::store::{StoreError, WorkflowStore};

/// Initialization failures
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("invalid task template: {0}")]
    Template(#[from] TemplateError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("event publishing error: {0}")]
    Event(#[from] PublishError),
}

/// Result of task initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInitializationResult {
    pub task_id: i64,
    pub task_uuid: Uuid,
    pub step_count: usize,
    pub edge_count: usize,
    /// Step name to created step id
    pub step_mapping: HashMap<String, i64>,
}

/// Creates tasks, steps, and edges from templates
pub struct TaskInitializer {
    store: Arc<dyn WorkflowStore>,
    publisher: EventPublisher,
}

impl TaskInitializer {
    pub fn new(store: Arc<dyn WorkflowStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Create a task and its DAG from a template and a submission request.
    /// The template is validated before any row is created.
    #[instrument(skip(self, template, request), fields(template = %template.key()))]
    pub async fn create_task(
        &self,
        template: &TaskTemplate,
        request: TaskRequest,
    ) -> Result<(Task, TaskInitializationResult), InitializationError> {
        template.validate()?;

        let task = self
            .store
            .create_task(NewTask {
                name: template.name.clone(),
                namespace: template.namespace.clone(),
                version: template.version.clone(),
                context: request.context,
                initiator: request.initiator,
                source_system: request.source_system,
                reason: request.reason,
            })
            .await?;

        let mut step_mapping = HashMap::with_capacity(template.steps.len());
        for step_template in &template.steps {
            let step = self
                .store
                .create_step(NewWorkflowStep {
                    task_id: task.task_id,
                    name: step_template.name.clone(),
                    handler_name: step_template.handler_name.clone(),
                    retry_limit: step_template.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT),
                    retryable: step_template.retryable,
                    timeout_seconds: step_template.timeout_seconds,
                    inputs: step_template.inputs.clone(),
                })
                .await?;
            step_mapping.insert(step_template.name.clone(), step.workflow_step_id);
        }

        let mut edge_count = 0;
        for step_template in &template.steps {
            let to_step_id = step_mapping[&step_template.name];
            for dependency in &step_template.depends_on {
                let from_step_id = step_mapping[dependency];
                self.store
                    .create_edge(NewWorkflowStepEdge::provides(
                        task.task_id,
                        from_step_id,
                        to_step_id,
                    ))
                    .await?;
                edge_count += 1;
            }
        }

        self.publisher
            .publish(
                events::TASK_INITIALIZED,
                json!({
                    "task_id": task.task_id,
                    "task_uuid": task.task_uuid,
                    "template": template.key(),
                    "step_count": step_mapping.len(),
                    "edge_count": edge_count,
                }),
            )
            .await?;

        info!(
            task_id = task.task_id,
            steps = step_mapping.len(),
            edges = edge_count,
            "Task initialized"
        );

        let result = TaskInitializationResult {
            task_id: task.task_id,
            task_uuid: task.task_uuid,
            step_count: step_mapping.len(),
            edge_count,
            step_mapping,
        };
        Ok((task, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepTemplate;
    use crate::store::MemoryStore;

    fn diamond_template() -> TaskTemplate {
        TaskTemplate::new(
            "fulfillment",
            "commerce",
            "1.0.0",
            vec![
                StepTemplate::new("reserve", "reserve_handler"),
                StepTemplate::new("charge", "charge_handler").depends_on(&["reserve"]),
                StepTemplate::new("label", "label_handler").depends_on(&["reserve"]),
                StepTemplate::new("dispatch", "dispatch_handler").depends_on(&["charge", "label"]),
            ],
        )
    }

    #[tokio::test]
    async fn creates_steps_and_edges_from_template() {
        let store = Arc::new(MemoryStore::new());
        let initializer = TaskInitializer::new(store.clone(), EventPublisher::default());

        let (task, result) = initializer
            .create_task(
                &diamond_template(),
                TaskRequest::new("fulfillment", "commerce")
                    .with_context(serde_json::json!({"order_id": 42})),
            )
            .await
            .unwrap();

        assert_eq!(result.step_count, 4);
        assert_eq!(result.edge_count, 4);
        assert_eq!(task.name, "fulfillment");
        assert_eq!(task.context.as_ref().unwrap()["order_id"], 42);

        let steps = store.steps_for_task(task.task_id).await.unwrap();
        assert_eq!(steps.len(), 4);
        let edges = store.edges_for_task(task.task_id).await.unwrap();
        assert_eq!(edges.len(), 4);

        // No transitions yet: every entity sits in its default pending state
        assert_eq!(store.current_task_state(task.task_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_template_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let initializer = TaskInitializer::new(store.clone(), EventPublisher::default());

        let template = TaskTemplate::new(
            "broken",
            "default",
            "1.0.0",
            vec![StepTemplate::new("a", "h").depends_on(&["missing"])],
        );
        let result = initializer
            .create_task(&template, TaskRequest::new("broken", "default"))
            .await;
        assert!(matches!(result, Err(InitializationError::Template(_))));
    }
}
