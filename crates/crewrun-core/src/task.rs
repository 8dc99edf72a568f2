//! Task type and its state machine.

use crate::{AgentId, CoreError, Priority, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Task represents one asynchronous unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Discriminator selecting the required capability and the handler.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Descriptive priority; does not affect scheduling order.
    pub priority: Priority,

    /// Opaque payload handed verbatim to the handler.
    pub data: Value,

    /// Agent executing this task, set when the task starts.
    pub assigned_agent: Option<AgentId>,

    /// Current task status.
    pub status: TaskStatus,

    /// Handler output on success.
    pub result: Option<Value>,

    /// Failure reason; never set together with `result`.
    pub error: Option<String>,

    /// When the task was submitted.
    pub created_at: DateTime<Utc>,

    /// When the task moved to InProgress.
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(task_type: impl Into<String>, priority: Priority, data: Value) -> Self {
        Self {
            id: TaskId::generate(),
            task_type: task_type.into(),
            priority,
            data,
            assigned_agent: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn check_transition(&self, next: TaskStatus) -> Result<(), CoreError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    /// Mark the task as started on `agent_id`.
    pub fn start(&mut self, agent_id: AgentId) -> Result<(), CoreError> {
        self.check_transition(TaskStatus::InProgress)?;
        self.status = TaskStatus::InProgress;
        self.assigned_agent = Some(agent_id);
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as completed with the handler's result.
    pub fn complete(&mut self, result: Value) -> Result<(), CoreError> {
        self.check_transition(TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as failed, capturing the error.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.check_transition(TaskStatus::Failed)?;
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
