//! # Data Model Layer
//!
//! Authoritative rows (tasks, workflow steps, dependency edges, transition
//! logs), the typed DAG templates, and the derived read-side projections
//! (step readiness, task execution context).

pub mod step_readiness_status;
pub mod task;
pub mod task_execution_context;
pub mod task_template;
pub mod transitions;
pub mod workflow_step;
pub mod workflow_step_edge;

pub use step_readiness_status::{StepReadinessStatus, TaskReadinessSummary};
pub use task::{NewTask, Task, TaskRequest};
pub use task_execution_context::TaskExecutionContext;
pub use task_template::{StepTemplate, TaskTemplate, TemplateError, DEFAULT_RETRY_LIMIT};
pub use transitions::{NewStepTransition, NewTaskTransition, StepTransition, TaskTransition};
pub use workflow_step::{NewWorkflowStep, WorkflowStep};
pub use workflow_step_edge::{NewWorkflowStepEdge, WorkflowStepEdge};
