//! In-process reference implementation of [`WorkflowStore`].
//!
//! Backed by parking_lot-guarded maps. Every mutation happens under a single
//! write lock, which gives the same atomicity the trait demands of durable
//! implementations (notably `claim_step` and transition appends).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{StepExecutionUpdate, StoreError, StoreResult, WorkflowStore};
use crate::models::{
    NewStepTransition, NewTask, NewTaskTransition, NewWorkflowStep, NewWorkflowStepEdge,
    StepTransition, Task, TaskTransition, WorkflowStep, WorkflowStepEdge,
};
use crate::state_machine::{TaskState, WorkflowStepState};

#[derive(Default)]
struct Inner {
    tasks: HashMap<i64, Task>,
    steps: HashMap<i64, WorkflowStep>,
    edges: Vec<WorkflowStepEdge>,
    task_transitions: HashMap<i64, Vec<TaskTransition>>,
    step_transitions: HashMap<i64, Vec<StepTransition>>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory workflow store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let task = Task {
            task_id: inner.next_id(),
            task_uuid: Uuid::new_v4(),
            name: new_task.name,
            namespace: new_task.namespace,
            version: new_task.version,
            context: new_task.context,
            initiator: new_task.initiator,
            source_system: new_task.source_system,
            reason: new_task.reason,
            complete: false,
            requested_at: now,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.task_id, task.clone());
        Ok(task)
    }

    async fn task(&self, task_id: i64) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().tasks.get(&task_id).cloned())
    }

    async fn set_task_complete(&self, task_id: i64, complete: bool) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let task = inner
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        task.complete = complete;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn create_step(&self, new_step: NewWorkflowStep) -> StoreResult<WorkflowStep> {
        let mut inner = self.inner.write();
        if !inner.tasks.contains_key(&new_step.task_id) {
            return Err(StoreError::TaskNotFound(new_step.task_id));
        }
        let now = Utc::now();
        let step = WorkflowStep {
            workflow_step_id: inner.next_id(),
            task_id: new_step.task_id,
            name: new_step.name,
            handler_name: new_step.handler_name,
            attempts: 0,
            retry_limit: new_step.retry_limit,
            retryable: new_step.retryable,
            in_process: false,
            processed: false,
            backoff_request_seconds: None,
            last_attempted_at: None,
            timeout_seconds: new_step.timeout_seconds,
            inputs: new_step.inputs,
            results: None,
            created_at: now,
            updated_at: now,
        };
        inner.steps.insert(step.workflow_step_id, step.clone());
        Ok(step)
    }

    async fn step(&self, step_id: i64) -> StoreResult<Option<WorkflowStep>> {
        Ok(self.inner.read().steps.get(&step_id).cloned())
    }

    async fn steps_for_task(&self, task_id: i64) -> StoreResult<Vec<WorkflowStep>> {
        let inner = self.inner.read();
        let mut steps: Vec<WorkflowStep> = inner
            .steps
            .values()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.workflow_step_id);
        Ok(steps)
    }

    async fn create_edge(&self, new_edge: NewWorkflowStepEdge) -> StoreResult<WorkflowStepEdge> {
        let mut inner = self.inner.write();
        for step_id in [new_edge.from_step_id, new_edge.to_step_id] {
            if !inner.steps.contains_key(&step_id) {
                return Err(StoreError::StepNotFound(step_id));
            }
        }
        let edge = WorkflowStepEdge {
            workflow_step_edge_id: inner.next_id(),
            task_id: new_edge.task_id,
            from_step_id: new_edge.from_step_id,
            to_step_id: new_edge.to_step_id,
            name: new_edge.name,
            created_at: Utc::now(),
        };
        inner.edges.push(edge.clone());
        Ok(edge)
    }

    async fn edges_for_task(&self, task_id: i64) -> StoreResult<Vec<WorkflowStepEdge>> {
        Ok(self
            .inner
            .read()
            .edges
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn update_step_execution(
        &self,
        step_id: i64,
        update: StepExecutionUpdate,
    ) -> StoreResult<WorkflowStep> {
        let mut inner = self.inner.write();
        let step = inner
            .steps
            .get_mut(&step_id)
            .ok_or(StoreError::StepNotFound(step_id))?;

        if let Some(attempts) = update.attempts {
            step.attempts = attempts;
        }
        if let Some(in_process) = update.in_process {
            step.in_process = in_process;
        }
        if let Some(processed) = update.processed {
            step.processed = processed;
        }
        if let Some(retryable) = update.retryable {
            step.retryable = retryable;
        }
        if let Some(backoff) = update.backoff_request_seconds {
            step.backoff_request_seconds = backoff;
        }
        if let Some(at) = update.last_attempted_at {
            step.last_attempted_at = Some(at);
        }
        if let Some(results) = update.results {
            step.results = Some(results);
        }
        step.updated_at = Utc::now();
        Ok(step.clone())
    }

    async fn claim_step(&self, step_id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let step = inner
            .steps
            .get_mut(&step_id)
            .ok_or(StoreError::StepNotFound(step_id))?;
        if step.in_process || step.processed {
            return Ok(false);
        }
        step.in_process = true;
        step.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_task_transition(
        &self,
        transition: NewTaskTransition,
    ) -> StoreResult<TaskTransition> {
        let mut inner = self.inner.write();
        if !inner.tasks.contains_key(&transition.task_id) {
            return Err(StoreError::TaskNotFound(transition.task_id));
        }
        let id = inner.next_id();
        let log = inner.task_transitions.entry(transition.task_id).or_default();
        for prior in log.iter_mut() {
            prior.most_recent = false;
        }
        let row = TaskTransition {
            task_transition_id: id,
            task_id: transition.task_id,
            from_state: transition.from_state,
            to_state: transition.to_state,
            event: transition.event,
            reason: transition.reason,
            sort_key: log.len() as i32 + 1,
            most_recent: true,
            created_at: Utc::now(),
        };
        log.push(row.clone());
        Ok(row)
    }

    async fn append_step_transition(
        &self,
        transition: NewStepTransition,
    ) -> StoreResult<StepTransition> {
        let mut inner = self.inner.write();
        if !inner.steps.contains_key(&transition.workflow_step_id) {
            return Err(StoreError::StepNotFound(transition.workflow_step_id));
        }
        let id = inner.next_id();
        let log = inner
            .step_transitions
            .entry(transition.workflow_step_id)
            .or_default();
        for prior in log.iter_mut() {
            prior.most_recent = false;
        }
        let row = StepTransition {
            step_transition_id: id,
            workflow_step_id: transition.workflow_step_id,
            from_state: transition.from_state,
            to_state: transition.to_state,
            event: transition.event,
            reason: transition.reason,
            sort_key: log.len() as i32 + 1,
            most_recent: true,
            created_at: Utc::now(),
        };
        log.push(row.clone());
        Ok(row)
    }

    async fn task_transitions(&self, task_id: i64) -> StoreResult<Vec<TaskTransition>> {
        Ok(self
            .inner
            .read()
            .task_transitions
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn step_transitions(&self, step_id: i64) -> StoreResult<Vec<StepTransition>> {
        Ok(self
            .inner
            .read()
            .step_transitions
            .get(&step_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn current_task_state(&self, task_id: i64) -> StoreResult<Option<TaskState>> {
        Ok(self
            .inner
            .read()
            .task_transitions
            .get(&task_id)
            .and_then(|log| log.last())
            .map(|row| row.to_state))
    }

    async fn current_step_state(&self, step_id: i64) -> StoreResult<Option<WorkflowStepState>> {
        Ok(self
            .inner
            .read()
            .step_transitions
            .get(&step_id)
            .and_then(|log| log.last())
            .map(|row| row.to_state))
    }

    async fn current_step_states(
        &self,
        task_id: i64,
    ) -> StoreResult<HashMap<i64, WorkflowStepState>> {
        let inner = self.inner.read();
        let mut states = HashMap::new();
        for step in inner.steps.values().filter(|s| s.task_id == task_id) {
            let state = inner
                .step_transitions
                .get(&step.workflow_step_id)
                .and_then(|log| log.last())
                .map(|row| row.to_state)
                .unwrap_or_default();
            states.insert(step.workflow_step_id, state);
        }
        Ok(states)
    }
}
