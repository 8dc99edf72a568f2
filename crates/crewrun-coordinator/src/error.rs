//! Coordinator errors.

use thiserror::Error;

use crewrun_core::{CoreError, TaskId};

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors surfaced by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No available agent anywhere has the capability a task needs.
    #[error("No eligible agent for task type '{task_type}' (capability '{capability}')")]
    NoEligibleAgent {
        task_type: String,
        capability: String,
    },

    /// The awaited task ended in Failed.
    #[error("Task {task_id} failed: {error}")]
    TaskFailed { task_id: TaskId, error: String },

    /// A workflow step depends on a step whose task failed.
    #[error("Step '{step}' cannot run: dependency '{dependency}' failed: {error}")]
    DependencyFailed {
        step: String,
        dependency: String,
        error: String,
    },

    /// A workflow step names a dependency that is not an earlier step.
    #[error("Step '{step}' depends on unknown or later step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// Two workflow steps share a key.
    #[error("Duplicate workflow step '{0}'")]
    DuplicateStep(String),

    /// Strict mode only: no handler registered for the task type.
    #[error("No handler registered for task type '{0}'")]
    HandlerNotFound(String),

    /// The coordinator was shut down and accepts no more tasks.
    #[error("Coordinator is shut down")]
    ShutDown,

    /// The event bus shut down while a caller was waiting on it.
    #[error("Event bus closed")]
    EventBusClosed,
}
