//! Core domain errors.

use thiserror::Error;

use crate::{AgentId, TaskId, TaskStatus};

/// Core domain errors for CrewRun.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Agent not found.
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// An agent with the same id is already registered.
    #[error("Duplicate agent: {0}")]
    DuplicateAgent(AgentId),

    /// Agent definition without any capability tag.
    #[error("Agent '{0}' declares no capabilities")]
    EmptyCapabilities(AgentId),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Invalid state transition.
    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Agent is holding a task and cannot take the requested status.
    #[error("Agent '{agent_id}' is busy with task {task_id}")]
    AgentBusy { agent_id: AgentId, task_id: TaskId },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
