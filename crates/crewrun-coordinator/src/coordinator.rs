//! Public facade over the coordinator runtime.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crewrun_core::{
    select_agent, Agent, AgentDefinition, AgentId, AgentStatus, CoreError, Priority, Task,
    TaskEvent, TaskEventKind, TaskId, TaskStatus,
};

use crate::bus::Subscription;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::handler::{HandlerError, HandlerRegistry, TaskHandler};
use crate::registry::AgentRegistry;
use crate::scheduler::Scheduler;
use crate::state::CoordinatorState;
use crate::workflow::{Workflow, WorkflowCoordinator, WorkflowReport};

/// Cancels the scheduler when the last coordinator handle goes away.
struct ShutdownGuard(CancellationToken);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Handle to a running coordinator.
///
/// Cheap to clone; all clones share the same agents, tasks and scheduler.
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<CoordinatorState>,
    shutdown: Arc<ShutdownGuard>,
}

/// Builder for [`Coordinator`].
#[derive(Debug, Default)]
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    agents: Vec<AgentDefinition>,
    handlers: HandlerRegistry,
}

impl CoordinatorBuilder {
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add agent definitions; registered in the given order.
    pub fn agents(mut self, definitions: impl IntoIterator<Item = AgentDefinition>) -> Self {
        self.agents.extend(definitions);
        self
    }

    pub fn agent(mut self, definition: AgentDefinition) -> Self {
        self.agents.push(definition);
        self
    }

    /// Register a handler for `task_type`.
    pub fn handler(mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.register(task_type, handler);
        self
    }

    /// Register an async closure as the handler for `task_type`.
    pub fn handler_fn<F, Fut>(mut self, task_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.register_fn(task_type, f);
        self
    }

    /// Replace the whole handler table.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register agents, then spawn the scheduler loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Coordinator> {
        let mut registry = AgentRegistry::new();
        registry.register_agents(self.agents)?;
        info!(agents = registry.len(), "Agent registry initialized");

        let state = CoordinatorState::new(self.config, registry, self.handlers);
        let token = CancellationToken::new();
        tokio::spawn(Scheduler::new(state.clone()).run(token.clone()));

        Ok(Coordinator {
            state,
            shutdown: Arc::new(ShutdownGuard(token)),
        })
    }
}

/// Task and agent counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub tasks: HashMap<TaskStatus, usize>,
    pub agents: HashMap<AgentStatus, usize>,
    /// Pending tasks whose capable agents are all busy.
    pub queued: usize,
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Submit a task; it starts asynchronously once an agent is matched.
    ///
    /// Fails with `ShutDown` once [`Coordinator::shutdown`] has been called.
    pub async fn submit_task(
        &self,
        task_type: impl Into<String>,
        priority: Priority,
        data: Value,
    ) -> Result<TaskId> {
        let task_type = task_type.into();
        if task_type.trim().is_empty() {
            return Err(CoreError::InvalidInput("task type must not be empty".into()).into());
        }
        if self.shutdown.0.is_cancelled() {
            return Err(CoordinatorError::ShutDown);
        }

        let id = {
            let mut tasks = self.state.tasks.write().await;
            let task = tasks.submit(task_type, priority, data);
            let id = task.id.clone();
            // Published under the lock so `submitted` always precedes `started`
            self.state.bus.publish(TaskEvent::submitted(task));
            id
        };

        debug!(task_id = %id, "Task submitted");
        self.state.wake.notify_one();
        Ok(id)
    }

    /// Snapshot of a task.
    pub async fn get_task_status(&self, task_id: &TaskId) -> Option<Task> {
        self.state.tasks.read().await.get(task_id).cloned()
    }

    /// Snapshot of all tasks in submission order.
    pub async fn get_all_tasks(&self) -> Vec<Task> {
        self.state
            .tasks
            .read()
            .await
            .list_all()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of an agent.
    pub async fn get_agent_status(&self, agent_id: &AgentId) -> Option<Agent> {
        self.state.agents.read().await.get(agent_id).cloned()
    }

    /// Snapshot of all agents in registration order.
    pub async fn get_all_agents(&self) -> Vec<Agent> {
        self.state.agents.read().await.list_all().to_vec()
    }

    /// Invoke `callback` for every event of `kind`.
    ///
    /// Every event is delivered; a slow callback only delays itself.
    pub fn on<F>(&self, kind: TaskEventKind, callback: F) -> Subscription
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        self.state.bus.on(kind, callback)
    }

    /// Invoke `callback` for every event whose kind is in `kinds`, in the
    /// order the events were published.
    pub fn on_any<F>(&self, kinds: &[TaskEventKind], callback: F) -> Subscription
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        self.state.bus.on_any(kinds, callback)
    }

    /// Receiver over all events published from now on.
    ///
    /// Bounded by `event_capacity`; a receiver that falls behind gets
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.state.bus.subscribe()
    }

    /// Stream over all events published from now on.
    pub fn events(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        self.state.bus.stream()
    }

    /// Wait until the task is terminal; resolve with its result or reject with
    /// its error.
    ///
    /// There is no built-in timeout; wrap in `tokio::time::timeout` if needed.
    pub async fn await_task(&self, task_id: &TaskId) -> Result<Value> {
        // Subscribe before checking the store so no terminal event slips by
        let mut rx = self.state.bus.subscribe();

        loop {
            if let Some(outcome) = self.terminal_outcome(task_id).await? {
                return outcome;
            }

            loop {
                match rx.recv().await {
                    Ok(event) if event.kind.is_terminal() && &event.task.id == task_id => {
                        return task_outcome(&event.task);
                    }
                    Ok(_) => {}
                    // Missed events; re-check the store
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CoordinatorError::EventBusClosed);
                    }
                }
            }
        }
    }

    async fn terminal_outcome(&self, task_id: &TaskId) -> Result<Option<Result<Value>>> {
        let tasks = self.state.tasks.read().await;
        let task = tasks
            .get(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.clone()))?;
        Ok(task.is_terminal().then(|| task_outcome(task)))
    }

    /// Run a multi-step workflow; see [`WorkflowCoordinator`].
    pub async fn coordinate_agents(&self, workflow: Workflow) -> Result<WorkflowReport> {
        WorkflowCoordinator::new(self).run(workflow).await
    }

    /// Take an idle agent out of rotation.
    pub async fn set_agent_offline(&self, agent_id: &AgentId) -> Result<()> {
        self.state
            .agents
            .write()
            .await
            .set_status(agent_id, AgentStatus::Offline, None)?;
        info!(agent_id = %agent_id, "Agent set offline");
        Ok(())
    }

    /// Return an offline agent to rotation.
    pub async fn set_agent_online(&self, agent_id: &AgentId) -> Result<()> {
        {
            let mut agents = self.state.agents.write().await;
            let agent = agents
                .get(agent_id)
                .ok_or_else(|| CoreError::UnknownAgent(agent_id.clone()))?;
            if agent.status != AgentStatus::Offline {
                return Ok(());
            }
            agents.set_status(agent_id, AgentStatus::Idle, None)?;
        }
        info!(agent_id = %agent_id, "Agent back online");
        self.state.wake.notify_one();
        Ok(())
    }

    /// Task and agent counts by status.
    pub async fn summary(&self) -> StatusSummary {
        let agents = self.state.agents.read().await;
        let tasks = self.state.tasks.read().await;

        let queued = tasks
            .unclaimed()
            .filter_map(|id| tasks.get(id))
            .filter(|task| select_agent(task, agents.list_all()).is_some_and(|a| !a.is_idle()))
            .count();
        let mut summary = StatusSummary {
            queued,
            ..StatusSummary::default()
        };
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            summary.tasks.insert(status, tasks.count_by_status(status));
        }
        for agent in agents.list_all() {
            *summary.agents.entry(agent.status).or_insert(0) += 1;
        }
        summary
    }

    /// Stop the scheduler loop; in-flight tasks still run to completion.
    ///
    /// Tasks still Pending are never started, and later submissions are
    /// rejected.
    pub fn shutdown(&self) {
        self.shutdown.0.cancel();
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.state.config
    }
}

fn task_outcome(task: &Task) -> Result<Value> {
    match task.status {
        TaskStatus::Failed => Err(CoordinatorError::TaskFailed {
            task_id: task.id.clone(),
            error: task.error.clone().unwrap_or_default(),
        }),
        _ => Ok(task.result.clone().unwrap_or(Value::Null)),
    }
}
