//! Capability matching: task type -> capability tag -> agent.

use crate::{Agent, Task};

/// Capability assigned to task types missing from [`CAPABILITY_TABLE`].
pub const GENERAL_CAPABILITY: &str = "general";

/// Static task type to capability mapping.
pub const CAPABILITY_TABLE: &[(&str, &str)] = &[
    ("generate_quiz", "quiz_generation"),
    ("grade_submission", "grading"),
    ("grade_quiz", "grading"),
    ("create_lesson", "content_creation"),
    ("summarize_content", "content_creation"),
    ("analyze_progress", "progress_tracking"),
    ("recommend_content", "recommendation"),
    ("translate_content", "translation"),
];

/// Map a task type to the capability an agent needs to run it.
///
/// Unknown types map to [`GENERAL_CAPABILITY`] instead of failing.
pub fn required_capability(task_type: &str) -> &'static str {
    CAPABILITY_TABLE
        .iter()
        .find(|(ty, _)| *ty == task_type)
        .map(|(_, cap)| *cap)
        .unwrap_or(GENERAL_CAPABILITY)
}

/// Select an agent for `task` from `agents` (registry order).
///
/// Pass 1 returns the first idle agent with the required capability. Pass 2
/// returns the first non-offline agent with it, so the task can wait for a
/// busy agent. `None` means no available agent has the capability at all.
pub fn select_agent<'a>(task: &Task, agents: &'a [Agent]) -> Option<&'a Agent> {
    let capability = required_capability(&task.task_type);

    agents
        .iter()
        .find(|a| a.is_idle() && a.has_capability(capability))
        .or_else(|| {
            agents
                .iter()
                .find(|a| a.status.is_available() && a.has_capability(capability))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentDefinition, AgentStatus, Priority, TaskId};
    use serde_json::Value;

    fn agent(id: &str, caps: &[&str]) -> Agent {
        let def = caps
            .iter()
            .fold(AgentDefinition::new(id, id), |d, c| d.with_capability(*c));
        Agent::from_definition(def).unwrap()
    }

    fn task(ty: &str) -> Task {
        Task::new(ty, Priority::Medium, Value::Null)
    }

    #[test]
    fn test_required_capability_lookup() {
        assert_eq!(required_capability("generate_quiz"), "quiz_generation");
        assert_eq!(required_capability("grade_submission"), "grading");
    }

    #[test]
    fn test_unknown_type_maps_to_general() {
        assert_eq!(required_capability("make_coffee"), GENERAL_CAPABILITY);
    }

    #[test]
    fn test_prefers_first_idle_agent() {
        let mut agents = vec![
            agent("a1", &["grading"]),
            agent("a2", &["grading"]),
            agent("a3", &["grading"]),
        ];
        agents[0].assign(TaskId::from("t0")).unwrap();

        let picked = select_agent(&task("grade_quiz"), &agents).unwrap();
        assert_eq!(picked.id.as_str(), "a2");
    }

    #[test]
    fn test_falls_back_to_busy_agent() {
        let mut agents = vec![agent("a1", &["grading"]), agent("a2", &["quiz_generation"])];
        agents[0].assign(TaskId::from("t0")).unwrap();

        let picked = select_agent(&task("grade_quiz"), &agents).unwrap();
        assert_eq!(picked.id.as_str(), "a1");
        assert_eq!(picked.status, AgentStatus::Busy);
    }

    #[test]
    fn test_offline_agents_are_skipped() {
        let mut agents = vec![agent("a1", &["grading"])];
        agents[0].status = AgentStatus::Offline;
        assert!(select_agent(&task("grade_quiz"), &agents).is_none());
    }

    #[test]
    fn test_no_capable_agent() {
        let agents = vec![agent("a1", &["grading"])];
        assert!(select_agent(&task("translate_content"), &agents).is_none());
    }
}
