//! Task scheduler - drains pending tasks into the runner.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crewrun_core::TaskId;

use crate::error::CoordinatorError;
use crate::runner::{Dispatch, TaskRunner};
use crate::state::CoordinatorState;

/// Task scheduler.
///
/// Each cycle moves at most one task out of the pending queue, in submission
/// order. The loop sleeps until woken by a submission or a terminal
/// transition, or until the configured interval elapses.
pub struct Scheduler {
    state: Arc<CoordinatorState>,
    runner: TaskRunner,
    /// Tasks already reported as having no eligible agent.
    unmatched: HashSet<TaskId>,
}

impl Scheduler {
    /// Create a new Scheduler.
    pub fn new(state: Arc<CoordinatorState>) -> Self {
        let runner = TaskRunner::new(state.clone());
        Self {
            state,
            runner,
            unmatched: HashSet::new(),
        }
    }

    /// Run one scheduling cycle.
    ///
    /// Returns the task that was started, if any. Tasks whose capable agents
    /// are all busy, and tasks without an eligible agent, are skipped and stay
    /// Pending for a later cycle.
    pub async fn run_cycle(&mut self) -> Option<TaskId> {
        let candidates: Vec<TaskId> = self.state.tasks.read().await.unclaimed().cloned().collect();

        for task_id in candidates {
            match self.runner.dispatch(&task_id).await {
                Ok(Dispatch::Started(agent_id)) => {
                    self.unmatched.remove(&task_id);
                    debug!(task_id = %task_id, agent_id = %agent_id, "Task started");
                    return Some(task_id);
                }
                Ok(Dispatch::Deferred(_)) => {
                    self.unmatched.remove(&task_id);
                }
                Err(CoordinatorError::NoEligibleAgent {
                    task_type,
                    capability,
                }) => {
                    if self.unmatched.insert(task_id.clone()) {
                        warn!(
                            task_id = %task_id,
                            task_type = %task_type,
                            capability = %capability,
                            "No eligible agent, task left pending"
                        );
                    }
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Failed to dispatch task");
                }
            }
        }
        None
    }

    /// Run the scheduler loop until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let interval = self.state.config.scheduler_interval();
        info!(interval_ms = interval.as_millis() as u64, "Scheduler started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.run_cycle().await.is_some() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.state.wake.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Scheduler stopped");
    }
}
