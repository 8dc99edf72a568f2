//! Built-in agent roster and stub handlers for the learning-platform task types.
//!
//! The handlers only shape a plausible result from the payload; real content
//! generation is supplied by callers through [`HandlerRegistry::register`].

use serde_json::{json, Value};
use uuid::Uuid;

use crewrun_core::AgentDefinition;

use crate::handler::{HandlerError, HandlerRegistry};

/// Default agent definitions, one per capability in the capability table,
/// plus a generalist serving unknown task types.
pub fn default_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new("quiz-generator", "Quiz Generator").with_capability("quiz_generation"),
        AgentDefinition::new("grader", "Grader").with_capability("grading"),
        AgentDefinition::new("content-creator", "Content Creator")
            .with_capability("content_creation"),
        AgentDefinition::new("progress-analyst", "Progress Analyst")
            .with_capability("progress_tracking"),
        AgentDefinition::new("recommender", "Recommender").with_capability("recommendation"),
        AgentDefinition::new("translator", "Translator").with_capability("translation"),
        AgentDefinition::new("generalist", "Generalist").with_capability("general"),
    ]
}

/// Handler table with the stub handlers and the default fallback.
pub fn handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_builtin_handlers(&mut registry);
    registry
}

/// Register the stub handlers on `registry`.
pub fn register_builtin_handlers(registry: &mut HandlerRegistry) {
    registry.register_fn("generate_quiz", |data| async move { generate_quiz(&data) });
    registry.register_fn("grade_submission", |data| async move { grade(&data) });
    registry.register_fn("grade_quiz", |data| async move { grade(&data) });
    registry.register_fn("analyze_progress", |data| async move { analyze_progress(&data) });
}

fn generate_quiz(data: &Value) -> Result<Value, HandlerError> {
    let difficulty = data
        .get("difficulty")
        .and_then(Value::as_str)
        .unwrap_or("medium");
    let topic = data.get("topic").and_then(Value::as_str).unwrap_or("general");
    let count = data
        .get("questionCount")
        .and_then(Value::as_u64)
        .unwrap_or(5);

    if count == 0 || count > 100 {
        return Err(HandlerError::new(format!(
            "questionCount must be between 1 and 100, got {count}"
        )));
    }

    let questions: Vec<Value> = (1..=count)
        .map(|n| json!({ "index": n, "prompt": format!("{topic} question {n} ({difficulty})") }))
        .collect();

    Ok(json!({
        "quizId": format!("quiz_{}", Uuid::new_v4().simple()),
        "topic": topic,
        "difficulty": difficulty,
        "questions": questions,
    }))
}

fn grade(data: &Value) -> Result<Value, HandlerError> {
    let answers = data
        .get("answers")
        .and_then(Value::as_array)
        .ok_or_else(|| HandlerError::new("missing 'answers' array"))?;
    let key = data
        .get("answerKey")
        .and_then(Value::as_array)
        .ok_or_else(|| HandlerError::new("missing 'answerKey' array"))?;

    if key.is_empty() {
        return Err(HandlerError::new("'answerKey' is empty"));
    }

    let correct = key
        .iter()
        .zip(answers.iter())
        .filter(|(expected, given)| expected == given)
        .count();
    let percentage = (correct as f64 / key.len() as f64) * 100.0;

    Ok(json!({
        "score": correct,
        "total": key.len(),
        "percentage": percentage,
        "passed": percentage >= 60.0,
    }))
}

fn analyze_progress(data: &Value) -> Result<Value, HandlerError> {
    let scores: Vec<f64> = data
        .get("scores")
        .and_then(Value::as_array)
        .map(|s| s.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    if scores.is_empty() {
        return Ok(json!({ "attempts": 0, "average": null, "trend": "none" }));
    }

    let average = scores.iter().sum::<f64>() / scores.len() as f64;
    let trend = match (scores.first(), scores.last()) {
        (Some(first), Some(last)) if last > first => "improving",
        (Some(first), Some(last)) if last < first => "declining",
        _ => "steady",
    };

    Ok(json!({ "attempts": scores.len(), "average": average, "trend": trend }))
}
