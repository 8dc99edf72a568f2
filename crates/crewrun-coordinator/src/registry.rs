//! Agent registry: identity, capabilities and status of every agent.

use std::collections::{HashMap, HashSet};

use crewrun_core::{Agent, AgentDefinition, AgentId, AgentStatus, CoreError, TaskId};

/// Registry of the fixed agent roster, in registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index: HashMap<AgentId, usize>,
}

impl AgentRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the registry from definitions.
    ///
    /// Either every definition is registered or none is.
    pub fn register_agents(&mut self, definitions: Vec<AgentDefinition>) -> Result<(), CoreError> {
        let mut seen: HashSet<AgentId> = self.index.keys().cloned().collect();
        let mut built = Vec::with_capacity(definitions.len());

        for def in definitions {
            if !seen.insert(def.id.clone()) {
                return Err(CoreError::DuplicateAgent(def.id));
            }
            built.push(Agent::from_definition(def)?);
        }

        for agent in built {
            self.index.insert(agent.id.clone(), self.agents.len());
            self.agents.push(agent);
        }
        Ok(())
    }

    /// Get an agent by ID.
    pub fn get(&self, agent_id: &AgentId) -> Option<&Agent> {
        self.index.get(agent_id).map(|&i| &self.agents[i])
    }

    /// All agents in registration order.
    pub fn list_all(&self) -> &[Agent] {
        &self.agents
    }

    /// Set an agent's status together with its current task.
    ///
    /// `Busy` requires a task; `Idle` and `Offline` require none. An agent
    /// holding a task cannot be taken offline.
    pub fn set_status(
        &mut self,
        agent_id: &AgentId,
        status: AgentStatus,
        current_task: Option<TaskId>,
    ) -> Result<(), CoreError> {
        let agent = self
            .index
            .get(agent_id)
            .map(|&i| &mut self.agents[i])
            .ok_or_else(|| CoreError::UnknownAgent(agent_id.clone()))?;

        match (status, current_task) {
            (AgentStatus::Busy, Some(task_id)) => agent.assign(task_id),
            (AgentStatus::Idle, None) => {
                agent.release();
                Ok(())
            }
            (AgentStatus::Offline, None) => {
                if let Some(task_id) = agent.current_task.clone() {
                    return Err(CoreError::AgentBusy {
                        agent_id: agent_id.clone(),
                        task_id,
                    });
                }
                agent.status = AgentStatus::Offline;
                Ok(())
            }
            (status, task) => Err(CoreError::InvalidInput(format!(
                "status {status} is incompatible with current task {task:?}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
