//! Task store: every submitted task and its lifecycle state.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crewrun_core::{AgentId, CoreError, Priority, Task, TaskId, TaskStatus};

/// A requested state change, carrying the data the target state needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Pending -> InProgress on the given agent.
    Start(AgentId),
    /// InProgress -> Completed with the handler result.
    Complete(Value),
    /// InProgress -> Failed with the captured error.
    Fail(String),
}

/// In-memory task store keyed by id, remembering submission order.
///
/// Tasks are retained for the process lifetime.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    /// Pending tasks not yet handed to an agent, in submission order.
    unclaimed: VecDeque<TaskId>,
}

impl TaskStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending task and return a snapshot of it.
    pub fn submit(&mut self, task_type: impl Into<String>, priority: Priority, data: Value) -> Task {
        self.insert(Task::new(task_type, priority, data))
    }

    /// Record an already built pending task.
    pub fn insert(&mut self, task: Task) -> Task {
        let id = task.id.clone();
        self.order.push(id.clone());
        self.unclaimed.push_back(id.clone());
        self.tasks.insert(id, task.clone());
        task
    }

    /// Get a task by ID.
    pub fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// All tasks in submission order.
    pub fn list_all(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    /// Pending tasks not yet claimed by the scheduler, in submission order.
    pub fn unclaimed(&self) -> impl Iterator<Item = &TaskId> {
        self.unclaimed.iter()
    }

    /// Mark a pending task as handed to an agent.
    pub fn claim(&mut self, task_id: &TaskId) {
        self.unclaimed.retain(|id| id != task_id);
    }

    /// Apply a state transition, enforcing the task state machine.
    pub fn transition(&mut self, task_id: &TaskId, transition: Transition) -> Result<&Task, CoreError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.clone()))?;

        match transition {
            Transition::Start(agent_id) => task.start(agent_id)?,
            Transition::Complete(result) => task.complete(result)?,
            Transition::Fail(error) => task.fail(error)?,
        }

        if task.status != TaskStatus::Pending {
            self.unclaimed.retain(|id| id != task_id);
        }
        Ok(task)
    }

    /// Count tasks in the given status.
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
