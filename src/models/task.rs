use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unit of work owning an ordered set of workflow steps.
///
/// Status is never stored on the task row itself; it is derived from the
/// most recent entry in the task transition log. Tasks are retained for
/// audit and are never hard-deleted while processing is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned row id
    pub task_id: i64,
    /// Externally visible identity
    pub task_uuid: Uuid,
    pub name: String,
    pub namespace: String,
    pub version: String,
    /// Opaque structured input supplied at submission
    pub context: Option<Value>,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
    /// Convenience flag mirroring the terminal `complete` transition
    pub complete: bool,
    pub requested_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable task data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub context: Option<Value>,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
}

/// A request to create and run a task against a registered template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub context: Option<Value>,
    pub initiator: Option<String>,
    pub source_system: Option<String>,
    pub reason: Option<String>,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: "1.0.0".to_string(),
            context: None,
            initiator: None,
            source_system: None,
            reason: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    pub fn with_source_system(mut self, source_system: impl Into<String>) -> Self {
        self.source_system = Some(source_system.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<TaskRequest> for NewTask {
    fn from(request: TaskRequest) -> Self {
        Self {
            name: request.name,
            namespace: request.namespace,
            version: request.version,
            context: request.context,
            initiator: request.initiator,
            source_system: request.source_system,
            reason: request.reason,
        }
    }
}
