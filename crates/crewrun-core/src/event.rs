//! Task lifecycle events published to observers.

use crate::{Agent, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskEventKind {
    #[serde(rename = "task:submitted")]
    Submitted,
    #[serde(rename = "task:started")]
    Started,
    #[serde(rename = "task:completed")]
    Completed,
    #[serde(rename = "task:failed")]
    Failed,
}

impl TaskEventKind {
    /// Wire name of the event, e.g. `task:started`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "task:submitted",
            Self::Started => "task:started",
            Self::Completed => "task:completed",
            Self::Failed => "task:failed",
        }
    }

    /// Returns true for the events that close a task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task:submitted" => Ok(Self::Submitted),
            "task:started" => Ok(Self::Started),
            "task:completed" => Ok(Self::Completed),
            "task:failed" => Ok(Self::Failed),
            other => Err(format!("unknown event '{other}'")),
        }
    }
}

/// A lifecycle event with snapshots taken at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Type of event.
    pub kind: TaskEventKind,
    /// Task state after the transition.
    pub task: Task,
    /// Agent involved, for started/completed/failed.
    pub agent: Option<Agent>,
    /// Handler output, for completed.
    pub result: Option<Value>,
    /// Failure reason, for failed.
    pub error: Option<String>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    fn new(kind: TaskEventKind, task: Task, agent: Option<Agent>) -> Self {
        Self {
            kind,
            task,
            agent,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a `task:submitted` event.
    pub fn submitted(task: Task) -> Self {
        Self::new(TaskEventKind::Submitted, task, None)
    }

    /// Create a `task:started` event.
    pub fn started(task: Task, agent: Agent) -> Self {
        Self::new(TaskEventKind::Started, task, Some(agent))
    }

    /// Create a `task:completed` event.
    pub fn completed(task: Task, agent: Agent) -> Self {
        let result = task.result.clone();
        Self {
            result,
            ..Self::new(TaskEventKind::Completed, task, Some(agent))
        }
    }

    /// Create a `task:failed` event.
    pub fn failed(task: Task, agent: Agent) -> Self {
        let error = task.error.clone();
        Self {
            error,
            ..Self::new(TaskEventKind::Failed, task, Some(agent))
        }
    }
}
