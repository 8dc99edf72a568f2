//! Agent definition and runtime state.

use crate::{AgentId, AgentStatus, CoreError, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static description of an agent, used once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent identifier.
    pub id: AgentId,

    /// Display label.
    pub name: String,

    /// Capability tags this agent can serve.
    pub capabilities: Vec<String>,
}

impl AgentDefinition {
    /// Create a new definition with no capabilities yet.
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: Vec::new(),
        }
    }

    /// Builder method to add a capability tag.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// A capability-bearing worker that executes at most one task at a time.
///
/// Identity and capabilities are fixed at construction; only `status` and
/// `current_task` change, always together. Deserialization applies the same
/// checks as [`Agent::from_definition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AgentSnapshot")]
pub struct Agent {
    /// Stable agent identifier.
    pub id: AgentId,

    /// Display label.
    pub name: String,

    capabilities: BTreeSet<String>,

    /// Current status.
    pub status: AgentStatus,

    /// Task currently held; `Some` exactly while `status` is Busy.
    pub current_task: Option<TaskId>,
}

/// Wire form of [`Agent`], validated before it becomes one.
#[derive(Deserialize)]
struct AgentSnapshot {
    id: AgentId,
    name: String,
    capabilities: Vec<String>,
    status: AgentStatus,
    current_task: Option<TaskId>,
}

impl TryFrom<AgentSnapshot> for Agent {
    type Error = CoreError;

    fn try_from(raw: AgentSnapshot) -> Result<Self, Self::Error> {
        let mut agent = Agent::from_definition(AgentDefinition {
            id: raw.id,
            name: raw.name,
            capabilities: raw.capabilities,
        })?;

        match (raw.status, raw.current_task) {
            (AgentStatus::Busy, Some(task_id)) => agent.assign(task_id)?,
            (AgentStatus::Idle, None) => {}
            (AgentStatus::Offline, None) => agent.status = AgentStatus::Offline,
            (status, task) => {
                return Err(CoreError::InvalidInput(format!(
                    "agent '{}' has status {status} with current task {task:?}",
                    agent.id
                )))
            }
        }
        Ok(agent)
    }
}

impl Agent {
    /// Build an idle agent from its definition.
    pub fn from_definition(def: AgentDefinition) -> Result<Self, CoreError> {
        let capabilities: BTreeSet<String> = def
            .capabilities
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if capabilities.is_empty() {
            return Err(CoreError::EmptyCapabilities(def.id));
        }

        Ok(Self {
            id: def.id,
            name: def.name,
            capabilities,
            status: AgentStatus::Idle,
            current_task: None,
        })
    }

    /// Capability tags of this agent.
    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Check if this agent serves the given capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    /// Move to Busy holding `task_id`.
    pub fn assign(&mut self, task_id: TaskId) -> Result<(), CoreError> {
        match (&self.status, &self.current_task) {
            (AgentStatus::Idle, _) => {
                self.status = AgentStatus::Busy;
                self.current_task = Some(task_id);
                Ok(())
            }
            (_, Some(held)) => Err(CoreError::AgentBusy {
                agent_id: self.id.clone(),
                task_id: held.clone(),
            }),
            (status, None) => Err(CoreError::InvalidInput(format!(
                "agent '{}' cannot take work while {}",
                self.id, status
            ))),
        }
    }

    /// Return to Idle and drop the held task.
    pub fn release(&mut self) {
        self.status = AgentStatus::Idle;
        self.current_task = None;
    }
}
