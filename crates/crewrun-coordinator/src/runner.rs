//! Task runner - drives one task from assignment to a terminal state.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, trace, warn};

use crewrun_core::{
    required_capability, select_agent, AgentId, AgentStatus, CoreError, TaskEvent, TaskId,
    TaskStatus,
};

use crate::error::{CoordinatorError, Result};
use crate::registry::AgentRegistry;
use crate::state::CoordinatorState;
use crate::store::{TaskStore, Transition};

/// Outcome of handing a pending task to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The task is now InProgress on this agent.
    Started(AgentId),
    /// Only busy agents can serve the task; it stays Pending and unclaimed
    /// until one of them, or any other capable agent, frees up.
    Deferred(AgentId),
}

/// A task that has just been marked InProgress and must be executed.
struct Assignment {
    task_id: TaskId,
    agent_id: AgentId,
    task_type: String,
    data: Value,
}

/// Task runner.
#[derive(Clone)]
pub struct TaskRunner {
    state: Arc<CoordinatorState>,
}

impl TaskRunner {
    /// Create a new TaskRunner.
    pub fn new(state: Arc<CoordinatorState>) -> Self {
        Self { state }
    }

    /// Match a pending task to an agent and start it.
    ///
    /// A pass-2 match on a busy agent leaves the task untouched so the next
    /// cycle can match it again, possibly to a sibling that went idle first.
    /// Returns `NoEligibleAgent` when no available agent has the capability;
    /// the task stays Pending and unclaimed in that case.
    pub async fn dispatch(&self, task_id: &TaskId) -> Result<Dispatch> {
        let mut agents = self.state.agents.write().await;
        let mut tasks = self.state.tasks.write().await;

        let task = tasks
            .get(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.clone()))?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::InvalidTransition {
                task_id: task_id.clone(),
                from: task.status,
                to: TaskStatus::InProgress,
            }
            .into());
        }

        let Some(agent) = select_agent(task, agents.list_all()) else {
            return Err(CoordinatorError::NoEligibleAgent {
                task_type: task.task_type.clone(),
                capability: required_capability(&task.task_type).to_string(),
            });
        };
        let agent_id = agent.id.clone();

        if !agent.is_idle() {
            trace!(task_id = %task_id, agent_id = %agent_id, "Capable agents busy, task deferred");
            return Ok(Dispatch::Deferred(agent_id));
        }

        tasks.claim(task_id);
        let assignment = self.start_locked(&mut agents, &mut tasks, task_id, &agent_id)?;
        drop(tasks);
        drop(agents);

        self.spawn_execution(assignment);
        Ok(Dispatch::Started(agent_id))
    }

    /// Mark agent Busy and task InProgress under the caller's guards, then
    /// publish `task:started`.
    fn start_locked(
        &self,
        agents: &mut AgentRegistry,
        tasks: &mut TaskStore,
        task_id: &TaskId,
        agent_id: &AgentId,
    ) -> Result<Assignment> {
        agents.set_status(agent_id, AgentStatus::Busy, Some(task_id.clone()))?;
        let task = match tasks.transition(task_id, Transition::Start(agent_id.clone())) {
            Ok(task) => task.clone(),
            Err(e) => {
                agents.set_status(agent_id, AgentStatus::Idle, None)?;
                return Err(e.into());
            }
        };
        let agent = agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownAgent(agent_id.clone()))?;

        info!(
            task_id = %task_id,
            agent_id = %agent_id,
            task_type = %task.task_type,
            priority = ?task.priority,
            "Assigning task to agent"
        );

        let assignment = Assignment {
            task_id: task.id.clone(),
            agent_id: agent_id.clone(),
            task_type: task.task_type.clone(),
            data: task.data.clone(),
        };
        self.state.bus.publish(TaskEvent::started(task, agent));
        Ok(assignment)
    }

    fn spawn_execution(&self, assignment: Assignment) {
        let runner = self.clone();
        tokio::spawn(async move { runner.execute(assignment).await });
    }

    /// Run the handler, record the outcome and release the agent.
    async fn execute(&self, assignment: Assignment) {
        let Assignment {
            task_id,
            agent_id,
            task_type,
            data,
        } = assignment;

        let outcome = match self.state.handlers.resolve(&task_type) {
            Some(handler) => {
                // Spawned so a panicking handler fails only its own task
                match tokio::spawn(async move { handler.handle(data).await }).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(join_err) if join_err.is_panic() => {
                        Err(format!("handler panicked: {}", panic_message(join_err)))
                    }
                    Err(join_err) => Err(format!("handler aborted: {join_err}")),
                }
            }
            None => Err(CoordinatorError::HandlerNotFound(task_type.clone()).to_string()),
        };

        self.finish(&task_id, &agent_id, outcome).await;
        // The released agent may serve a deferred task
        self.state.wake.notify_one();
    }

    async fn finish(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        outcome: std::result::Result<Value, String>,
    ) {
        let mut agents = self.state.agents.write().await;
        let mut tasks = self.state.tasks.write().await;

        let (transition, succeeded) = match outcome {
            Ok(result) => (Transition::Complete(result), true),
            Err(error) => {
                warn!(task_id = %task_id, agent_id = %agent_id, error = %error, "Task failed");
                (Transition::Fail(error), false)
            }
        };

        let recorded = tasks.transition(task_id, transition).cloned();

        // Release regardless of how the transition went
        if let Err(e) = agents.set_status(agent_id, AgentStatus::Idle, None) {
            error!(agent_id = %agent_id, error = %e, "Failed to release agent");
        }

        match recorded {
            Ok(task) => {
                let agent = agents.get(agent_id).cloned();
                if succeeded {
                    info!(task_id = %task_id, agent_id = %agent_id, "Task completed");
                }
                if let Some(agent) = agent {
                    let event = if succeeded {
                        TaskEvent::completed(task, agent)
                    } else {
                        TaskEvent::failed(task, agent)
                    };
                    self.state.bus.publish(event);
                }
            }
            Err(e) => error!(task_id = %task_id, error = %e, "Failed to record task outcome"),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
