//! Workflow coordinator - ordered steps gated on their dependencies.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crewrun_core::{Priority, TaskId};

use crate::coordinator::Coordinator;
use crate::error::{CoordinatorError, Result};

/// One step of a workflow; becomes exactly one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Key other steps use to depend on this one.
    pub step_key: String,

    /// Task type to submit.
    pub action: String,

    /// Payload for the task.
    #[serde(default)]
    pub data: Value,

    /// Keys of earlier steps that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub priority: Priority,
}

impl WorkflowStep {
    pub fn new(step_key: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self {
            step_key: step_key.into(),
            action: action.into(),
            data,
            depends_on: Vec::new(),
            priority: Priority::default(),
        }
    }

    /// Builder method to add a dependency.
    pub fn depends_on(mut self, step_key: impl Into<String>) -> Self {
        self.depends_on.push(step_key.into());
        self
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Builder method to append a step.
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Reject duplicate keys and dependencies that are not earlier steps.
    pub fn validate(&self) -> Result<()> {
        let mut earlier: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                if !earlier.contains(dep.as_str()) {
                    return Err(CoordinatorError::UnknownDependency {
                        step: step.step_key.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if !earlier.insert(step.step_key.as_str()) {
                return Err(CoordinatorError::DuplicateStep(step.step_key.clone()));
            }
        }
        Ok(())
    }
}

/// Terminal outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Completed(Value),
    Failed(String),
}

/// Per-step results of a finished workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub name: String,
    /// Step key -> outcome.
    pub results: HashMap<String, StepOutcome>,
    /// Step key -> the task the step became.
    pub task_ids: HashMap<String, TaskId>,
}

impl WorkflowReport {
    /// Result of a completed step.
    pub fn result(&self, step_key: &str) -> Option<&Value> {
        match self.results.get(step_key) {
            Some(StepOutcome::Completed(value)) => Some(value),
            _ => None,
        }
    }
}

/// Runs workflows against a [`Coordinator`].
///
/// Steps are submitted in list order, each awaited before the next is
/// submitted. A step with dependencies is only submitted once every dependency
/// has completed; if one failed, the workflow fails with `DependencyFailed`
/// and no later step is submitted. A failed step without dependents does not
/// stop the workflow.
pub struct WorkflowCoordinator<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> WorkflowCoordinator<'a> {
    pub fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub async fn run(&self, workflow: Workflow) -> Result<WorkflowReport> {
        workflow.validate()?;
        info!(workflow = %workflow.name, steps = workflow.steps.len(), "Starting workflow");

        let mut report = WorkflowReport {
            name: workflow.name.clone(),
            ..WorkflowReport::default()
        };

        for step in workflow.steps {
            for dep in &step.depends_on {
                let dep_task = report.task_ids.get(dep).ok_or_else(|| {
                    CoordinatorError::UnknownDependency {
                        step: step.step_key.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                match self.coordinator.await_task(dep_task).await {
                    Ok(_) => {}
                    Err(CoordinatorError::TaskFailed { error, .. }) => {
                        warn!(
                            workflow = %report.name,
                            step = %step.step_key,
                            dependency = %dep,
                            "Dependency failed, aborting workflow"
                        );
                        return Err(CoordinatorError::DependencyFailed {
                            step: step.step_key,
                            dependency: dep.clone(),
                            error,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }

            let task_id = self
                .coordinator
                .submit_task(step.action.clone(), step.priority, step.data)
                .await?;
            info!(
                workflow = %report.name,
                step = %step.step_key,
                task_id = %task_id,
                action = %step.action,
                "Workflow step submitted"
            );
            report.task_ids.insert(step.step_key.clone(), task_id.clone());

            let outcome = match self.coordinator.await_task(&task_id).await {
                Ok(value) => StepOutcome::Completed(value),
                Err(CoordinatorError::TaskFailed { error, .. }) => StepOutcome::Failed(error),
                Err(e) => return Err(e),
            };
            info!(
                workflow = %report.name,
                step = %step.step_key,
                completed = matches!(outcome, StepOutcome::Completed(_)),
                "Workflow step finished"
            );
            report.results.insert(step.step_key, outcome);
        }

        info!(workflow = %report.name, "Workflow finished");
        Ok(report)
    }
}
