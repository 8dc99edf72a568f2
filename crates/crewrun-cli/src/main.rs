//! CrewRun CLI - run tasks and workflows against an in-process coordinator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crewrun_coordinator::{
    builtin, metrics, Coordinator, CoordinatorConfig, Workflow, WorkflowStep,
};
use crewrun_core::{AgentDefinition, Priority, TaskEventKind};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// CrewRun CLI - capability-based task coordination
#[derive(Parser)]
#[command(name = "crewrun")]
#[command(about = "Run tasks and workflows on a roster of agents", long_about = None)]
struct Cli {
    /// JSON file with agent definitions (defaults to the built-in roster)
    #[arg(long, global = true)]
    agents: Option<PathBuf>,

    /// JSON file with coordinator configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fail tasks that have no registered handler
    #[arg(long, global = true)]
    strict: bool,

    /// Scheduler wake-up interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Give up waiting for results after this many seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured agents
    Agents,

    /// Submit one task and print its result
    Run {
        /// Task type, e.g. generate_quiz
        #[arg(short = 't', long = "type")]
        task_type: String,

        /// Task priority (low, medium, high, critical)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Task payload as JSON
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: Value,
    },

    /// Run a workflow described in a JSON file
    Workflow {
        /// Path to the workflow file
        file: PathBuf,
    },

    /// Generate a quiz, grade it and print the results and metrics
    Demo,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("crewrun_coordinator=info,crewrun=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);
    let coordinator = build_coordinator(&cli)?;

    match cli.command {
        Commands::Agents => {
            list_agents(&coordinator).await?;
        }
        Commands::Run {
            task_type,
            priority,
            data,
        } => {
            run_task(&coordinator, task_type, priority, data, timeout).await?;
        }
        Commands::Workflow { file } => {
            let workflow: Workflow = read_json(&file)?;
            run_workflow(&coordinator, workflow, timeout).await?;
        }
        Commands::Demo => {
            demo(&coordinator, timeout).await?;
        }
    }

    coordinator.shutdown();
    Ok(())
}

fn build_coordinator(cli: &Cli) -> CliResult<Coordinator> {
    let mut config = match &cli.config {
        Some(path) => read_json::<CoordinatorConfig>(path)?,
        None => CoordinatorConfig::default(),
    };
    if cli.strict {
        config = config.with_strict_handlers(true);
    }
    if let Some(ms) = cli.interval_ms {
        config = config.with_scheduler_interval(Duration::from_millis(ms));
    }

    let agents: Vec<AgentDefinition> = match &cli.agents {
        Some(path) => read_json(path)?,
        None => builtin::default_agents(),
    };
    info!(agents = agents.len(), strict = config.strict_handlers, "Starting coordinator");

    Ok(Coordinator::builder()
        .config(config)
        .agents(agents)
        .handlers(builtin::handlers())
        .build()?)
}

async fn list_agents(coordinator: &Coordinator) -> CliResult<()> {
    let agents = coordinator.get_all_agents().await;

    println!("Agents ({}):", agents.len());
    println!("{:<20}  {:<8}  {}", "ID", "STATUS", "CAPABILITIES");
    println!("{}", "-".repeat(60));

    for agent in agents {
        let caps: Vec<&str> = agent.capabilities().iter().map(String::as_str).collect();
        println!(
            "{:<20}  {:<8}  {}",
            agent.id.as_str(),
            agent.status.as_str(),
            caps.join(", ")
        );
    }

    Ok(())
}

async fn run_task(
    coordinator: &Coordinator,
    task_type: String,
    priority: Priority,
    data: Value,
    timeout: Duration,
) -> CliResult<()> {
    let id = coordinator.submit_task(task_type, priority, data).await?;
    info!(task_id = %id, "Waiting for task");

    let outcome = tokio::time::timeout(timeout, coordinator.await_task(&id))
        .await
        .map_err(|_| format!("timed out after {}s waiting for {id}", timeout.as_secs()))?;

    if let Some(task) = coordinator.get_task_status(&id).await {
        println!("{}", serde_json::to_string_pretty(&task)?);
    }
    outcome?;
    Ok(())
}

async fn run_workflow(
    coordinator: &Coordinator,
    workflow: Workflow,
    timeout: Duration,
) -> CliResult<()> {
    let report = tokio::time::timeout(timeout, coordinator.coordinate_agents(workflow))
        .await
        .map_err(|_| format!("timed out after {}s waiting for workflow", timeout.as_secs()))??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn demo(coordinator: &Coordinator, timeout: Duration) -> CliResult<()> {
    let events = coordinator.on(TaskEventKind::Completed, |event| {
        info!(task_id = %event.task.id, task_type = %event.task.task_type, "Task completed");
    });

    let workflow = Workflow::new("quiz-and-grade")
        .step(WorkflowStep::new(
            "quiz",
            "generate_quiz",
            json!({ "topic": "fractions", "difficulty": "easy", "questionCount": 3 }),
        ))
        .step(
            WorkflowStep::new(
                "grade",
                "grade_quiz",
                json!({ "answers": ["1/2", "3/4", "2/3"], "answerKey": ["1/2", "3/4", "1/3"] }),
            )
            .depends_on("quiz"),
        )
        .step(WorkflowStep::new(
            "progress",
            "analyze_progress",
            json!({ "scores": [40, 55, 66.7] }),
        ));

    run_workflow(coordinator, workflow, timeout).await?;
    events.unsubscribe();

    print!("{}", metrics::collect_metrics(coordinator).await);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))?)
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}
