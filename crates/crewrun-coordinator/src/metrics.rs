//! Prometheus metrics collection and formatting.
//!
//! This module renders coordinator state in Prometheus text exposition format.

use std::fmt::Write;

use crewrun_core::{AgentStatus, TaskStatus};

use crate::coordinator::{Coordinator, StatusSummary};

/// Collect all metrics from the coordinator and format as Prometheus text.
pub async fn collect_metrics(coordinator: &Coordinator) -> String {
    render(&coordinator.summary().await)
}

/// Format a status summary as Prometheus text.
pub fn render(summary: &StatusSummary) -> String {
    let mut output = String::new();

    writeln!(output, "# HELP crewrun_agents Number of agents by status").ok();
    writeln!(output, "# TYPE crewrun_agents gauge").ok();
    for status in [AgentStatus::Idle, AgentStatus::Busy, AgentStatus::Offline] {
        let count = summary.agents.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "crewrun_agents{{status=\"{}\"}} {count}",
            status.as_str().to_ascii_lowercase()
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(output, "# HELP crewrun_tasks Number of tasks by status").ok();
    writeln!(output, "# TYPE crewrun_tasks gauge").ok();
    for status in [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ] {
        let count = summary.tasks.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "crewrun_tasks{{status=\"{}\"}} {count}",
            status.as_str().to_ascii_lowercase()
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP crewrun_tasks_queued Pending tasks whose capable agents are all busy"
    )
    .ok();
    writeln!(output, "# TYPE crewrun_tasks_queued gauge").ok();
    writeln!(output, "crewrun_tasks_queued {}", summary.queued).ok();

    output
}
