//! End-to-end scheduling behavior of the coordinator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, Barrier, Notify};

use crewrun_coordinator::{builtin, Coordinator, CoordinatorConfig, CoordinatorError, HandlerError};
use crewrun_core::{
    required_capability, AgentDefinition, AgentId, AgentStatus, CoreError, Priority, TaskEvent,
    TaskEventKind, TaskId, TaskStatus,
};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("crewrun_coordinator=debug")
        .with_test_writer()
        .try_init();
}

async fn await_ok(coordinator: &Coordinator, id: &TaskId) -> Value {
    tokio::time::timeout(WAIT, coordinator.await_task(id))
        .await
        .expect("task did not finish in time")
        .expect("task failed")
}

fn drain(rx: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn quiz_task_runs_on_quiz_agent() {
    init_tracing();
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("agentX", "Quiz Generator").with_capability("quiz_generation"))
        .agent(AgentDefinition::new("agentY", "Grader").with_capability("grading"))
        .handlers(builtin::handlers())
        .build()
        .unwrap();
    let agent_x = AgentId::from("agentX");
    assert_eq!(
        coordinator.get_agent_status(&agent_x).await.unwrap().status,
        AgentStatus::Idle
    );

    let mut rx = coordinator.subscribe();
    let id = coordinator
        .submit_task("generate_quiz", Priority::Medium, json!({"difficulty": "easy"}))
        .await
        .unwrap();
    let result = await_ok(&coordinator, &id).await;

    assert!(result["quizId"].as_str().is_some_and(|q| !q.is_empty()));
    assert_eq!(result["difficulty"], "easy");

    let task = coordinator.get_task_status(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_agent, Some(agent_x.clone()));
    assert_eq!(task.result.as_ref(), Some(&result));

    let events = drain(&mut rx);
    let kinds: Vec<TaskEventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TaskEventKind::Submitted,
            TaskEventKind::Started,
            TaskEventKind::Completed
        ]
    );
    let started_agent = events[1].agent.as_ref().unwrap();
    assert_eq!(started_agent.id, agent_x);
    assert_eq!(started_agent.status, AgentStatus::Busy);
    assert_eq!(started_agent.current_task.as_ref(), Some(&id));
    assert_eq!(events[2].agent.as_ref().unwrap().status, AgentStatus::Idle);

    let agent = coordinator.get_agent_status(&agent_x).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert!(agent.current_task.is_none());
}

#[tokio::test]
async fn pending_queue_ignores_priority() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("grader", "Grader").with_capability("grading"))
        .handler_fn("grade_quiz", |data| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(data)
        })
        .build()
        .unwrap();
    let mut rx = coordinator.subscribe();

    let mut submitted = Vec::new();
    for (n, priority) in [Priority::Low, Priority::Critical, Priority::Low].into_iter().enumerate() {
        submitted.push(
            coordinator
                .submit_task("grade_quiz", priority, json!({ "n": n }))
                .await
                .unwrap(),
        );
    }
    for id in &submitted {
        await_ok(&coordinator, id).await;
    }

    let started: Vec<TaskId> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.kind == TaskEventKind::Started)
        .map(|e| e.task.id)
        .collect();
    assert_eq!(started, submitted);
}

#[tokio::test]
async fn unknown_task_type_uses_general_agent_and_default_handler() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("generalist", "Generalist").with_capability("general"))
        .build()
        .unwrap();
    assert_eq!(required_capability("brew_coffee"), "general");

    let id = coordinator
        .submit_task("brew_coffee", Priority::Low, json!({"size": "large"}))
        .await
        .unwrap();
    let result = await_ok(&coordinator, &id).await;

    assert_eq!(result, json!({"success": true}));
    let task = coordinator.get_task_status(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_agent, Some(AgentId::from("generalist")));
}

#[tokio::test]
async fn failing_handler_releases_agent() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("worker", "Worker").with_capability("general"))
        .handler_fn("explode", |_| async { Err::<Value, _>(HandlerError::new("kaboom")) })
        .build()
        .unwrap();
    let mut rx = coordinator.subscribe();

    let id = coordinator
        .submit_task("explode", Priority::High, json!({}))
        .await
        .unwrap();
    let err = tokio::time::timeout(WAIT, coordinator.await_task(&id))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        CoordinatorError::TaskFailed {
            task_id: id.clone(),
            error: "kaboom".into()
        }
    );

    let task = coordinator.get_task_status(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("kaboom"));
    assert!(task.result.is_none());

    let agent = coordinator.get_agent_status(&AgentId::from("worker")).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert!(agent.current_task.is_none());

    let failed = drain(&mut rx)
        .into_iter()
        .find(|e| e.kind == TaskEventKind::Failed)
        .unwrap();
    assert_eq!(failed.error.as_deref(), Some("kaboom"));
}

#[tokio::test]
async fn panicking_handler_fails_only_its_task() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("worker", "Worker").with_capability("general"))
        .handler_fn("panic", |data: Value| async move {
            if data.get("boom").is_some() {
                panic!("handler bug");
            }
            Ok(data)
        })
        .build()
        .unwrap();

    let bad = coordinator
        .submit_task("panic", Priority::Low, json!({"boom": true}))
        .await
        .unwrap();
    let good = coordinator.submit_task("noop", Priority::Low, json!({})).await.unwrap();

    let err = tokio::time::timeout(WAIT, coordinator.await_task(&bad))
        .await
        .unwrap()
        .unwrap_err();
    match err {
        CoordinatorError::TaskFailed { error, .. } => assert!(error.contains("handler bug")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(await_ok(&coordinator, &good).await, json!({"success": true}));

    let agent = coordinator.get_agent_status(&AgentId::from("worker")).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_tasks_run_concurrently_on_distinct_agents() {
    init_tracing();
    let kinds = [
        ("generate_quiz", "quiz_generation"),
        ("grade_quiz", "grading"),
        ("create_lesson", "content_creation"),
        ("analyze_progress", "progress_tracking"),
        ("translate_content", "translation"),
    ];
    // Every handler waits for all five, so this only passes if they overlap
    let barrier = Arc::new(Barrier::new(kinds.len()));

    let mut builder = Coordinator::builder();
    for (task_type, capability) in kinds {
        builder = builder.agent(AgentDefinition::new(capability, capability).with_capability(capability));
        let barrier = barrier.clone();
        builder = builder.handler_fn(task_type, move |data| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok(data)
            }
        });
    }
    let coordinator = builder.build().unwrap();
    let mut rx = coordinator.subscribe();

    let mut ids = Vec::new();
    for (task_type, _) in kinds {
        ids.push(
            coordinator
                .submit_task(task_type, Priority::Medium, json!({ "type": task_type }))
                .await
                .unwrap(),
        );
    }
    for id in &ids {
        await_ok(&coordinator, id).await;
    }

    let mut busy: HashSet<AgentId> = HashSet::new();
    let mut used: HashSet<AgentId> = HashSet::new();
    for event in drain(&mut rx) {
        let Some(agent) = event.agent else { continue };
        match event.kind {
            TaskEventKind::Started => {
                assert!(busy.insert(agent.id.clone()), "agent {} double-assigned", agent.id);
                used.insert(agent.id);
            }
            TaskEventKind::Completed | TaskEventKind::Failed => {
                assert!(busy.remove(&agent.id));
            }
            TaskEventKind::Submitted => {}
        }
    }
    assert_eq!(used.len(), 5);

    for task in coordinator.get_all_tasks().await {
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

#[tokio::test]
async fn contended_agent_runs_one_task_at_a_time() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("solo", "Solo").with_capability("general"))
        .handler_fn("work", |data| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(data)
        })
        .build()
        .unwrap();
    let mut rx = coordinator.subscribe();

    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(coordinator.submit_task("work", Priority::Medium, json!(n)).await.unwrap());
    }
    for id in &ids {
        await_ok(&coordinator, id).await;
    }

    let mut running: Option<TaskId> = None;
    for event in drain(&mut rx) {
        match event.kind {
            TaskEventKind::Started => {
                assert!(running.is_none(), "agent started a second task");
                running = Some(event.task.id);
            }
            TaskEventKind::Completed => {
                assert_eq!(running.take(), Some(event.task.id));
            }
            _ => {}
        }
    }
    assert_eq!(coordinator.summary().await.queued, 0);
}

#[tokio::test]
async fn task_without_capable_agent_stays_pending() {
    init_tracing();
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("translator", "Translator").with_capability("translation"))
        .agent(AgentDefinition::new("generalist", "Generalist").with_capability("general"))
        .config(CoordinatorConfig::default().with_scheduler_interval(Duration::from_millis(10)))
        .build()
        .unwrap();
    let translator = AgentId::from("translator");
    coordinator.set_agent_offline(&translator).await.unwrap();

    let stuck = coordinator
        .submit_task("translate_content", Priority::Critical, json!({}))
        .await
        .unwrap();
    let other = coordinator
        .submit_task("anything", Priority::Low, json!({}))
        .await
        .unwrap();

    await_ok(&coordinator, &other).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let task = coordinator.get_task_status(&stuck).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.assigned_agent.is_none());

    coordinator.set_agent_online(&translator).await.unwrap();
    await_ok(&coordinator, &stuck).await;
    assert_eq!(
        coordinator.get_task_status(&stuck).await.unwrap().assigned_agent,
        Some(translator)
    );
}

#[tokio::test]
async fn busy_agent_cannot_go_offline() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("worker", "Worker").with_capability("general"))
        .handler_fn("hold", |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        })
        .build()
        .unwrap();
    let worker = AgentId::from("worker");

    let id = coordinator.submit_task("hold", Priority::Low, json!({})).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while coordinator.get_agent_status(&worker).await.unwrap().status != AgentStatus::Busy {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let err = coordinator.set_agent_offline(&worker).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Core(CoreError::AgentBusy { .. })));
    await_ok(&coordinator, &id).await;
}

#[tokio::test]
async fn strict_mode_fails_unhandled_types() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("generalist", "Generalist").with_capability("general"))
        .config(CoordinatorConfig::default().with_strict_handlers(true))
        .build()
        .unwrap();

    let id = coordinator.submit_task("mystery", Priority::Low, json!({})).await.unwrap();
    let err = tokio::time::timeout(WAIT, coordinator.await_task(&id))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::TaskFailed { ref error, .. } if error.contains("mystery")));
    assert_eq!(
        coordinator.get_agent_status(&AgentId::from("generalist")).await.unwrap().status,
        AgentStatus::Idle
    );
}

#[tokio::test]
async fn duplicate_agents_are_rejected() {
    let result = Coordinator::builder()
        .agent(AgentDefinition::new("a", "A").with_capability("general"))
        .agent(AgentDefinition::new("a", "A again").with_capability("grading"))
        .build();
    assert!(matches!(
        result.err(),
        Some(CoordinatorError::Core(CoreError::DuplicateAgent(_)))
    ));
}

#[tokio::test]
async fn lookups_of_unknown_ids() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("a", "A").with_capability("general"))
        .build()
        .unwrap();

    assert!(coordinator.get_task_status(&TaskId::from("nope")).await.is_none());
    assert!(coordinator.get_agent_status(&AgentId::from("nope")).await.is_none());
    assert!(matches!(
        coordinator.await_task(&TaskId::from("nope")).await,
        Err(CoordinatorError::Core(CoreError::TaskNotFound(_)))
    ));
    assert!(matches!(
        coordinator.set_agent_offline(&AgentId::from("nope")).await,
        Err(CoordinatorError::Core(CoreError::UnknownAgent(_)))
    ));
}

#[tokio::test]
async fn on_callback_sees_lifecycle_in_order() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("g", "G").with_capability("general"))
        .build()
        .unwrap();
    let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();
    let sub = coordinator.on_any(
        &[
            TaskEventKind::Submitted,
            TaskEventKind::Started,
            TaskEventKind::Completed,
        ],
        move |event| {
            let _ = tx.send((event.kind, event.task.id));
        },
    );

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(coordinator.submit_task("noop", Priority::Low, json!({})).await.unwrap());
    }
    for id in &ids {
        await_ok(&coordinator, id).await;
    }

    let mut events = Vec::new();
    for _ in 0..ids.len() * 3 {
        events.push(tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap());
    }
    for id in &ids {
        let kinds: Vec<TaskEventKind> = events
            .iter()
            .filter(|(_, task_id)| task_id == id)
            .map(|(kind, _)| *kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TaskEventKind::Submitted,
                TaskEventKind::Started,
                TaskEventKind::Completed
            ]
        );
    }
    sub.unsubscribe();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_callback_sees_every_event() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("g", "G").with_capability("general"))
        .config(CoordinatorConfig::default().with_event_capacity(16))
        .build()
        .unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _sub = coordinator.on(TaskEventKind::Submitted, move |_| {
        std::thread::sleep(Duration::from_micros(200));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    const BURST: usize = 1000;
    for _ in 0..BURST {
        coordinator.submit_task("noop", Priority::Low, json!({})).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while seen.load(Ordering::SeqCst) < BURST {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("callback missed events");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), BURST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deferred_task_runs_on_sibling_that_frees_up_first() {
    let gate = Arc::new(Notify::new());
    let hold = gate.clone();
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("a", "Grader A").with_capability("grading"))
        .agent(AgentDefinition::new("b", "Grader B").with_capability("grading"))
        .handler_fn("grade_quiz", move |data: Value| {
            let hold = hold.clone();
            async move {
                if data["hold"] == true {
                    hold.notified().await;
                } else {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(data)
            }
        })
        .build()
        .unwrap();

    let long = coordinator
        .submit_task("grade_quiz", Priority::Medium, json!({"hold": true}))
        .await
        .unwrap();
    let short = coordinator
        .submit_task("grade_quiz", Priority::Medium, json!({"n": 2}))
        .await
        .unwrap();
    let third = coordinator
        .submit_task("grade_quiz", Priority::Medium, json!({"n": 3}))
        .await
        .unwrap();

    await_ok(&coordinator, &short).await;
    tokio::time::timeout(Duration::from_secs(2), coordinator.await_task(&third))
        .await
        .expect("third task waited for the held agent")
        .unwrap();

    let third = coordinator.get_task_status(&third).await.unwrap();
    assert_eq!(third.assigned_agent, Some(AgentId::from("b")));
    assert_eq!(
        coordinator.get_task_status(&long).await.unwrap().status,
        TaskStatus::InProgress
    );
    assert_eq!(coordinator.summary().await.queued, 0);

    gate.notify_one();
    await_ok(&coordinator, &long).await;
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("g", "G").with_capability("general"))
        .build()
        .unwrap();
    let id = coordinator.submit_task("noop", Priority::Low, json!({})).await.unwrap();
    await_ok(&coordinator, &id).await;

    coordinator.shutdown();
    assert_eq!(
        coordinator.submit_task("noop", Priority::Low, json!({})).await,
        Err(CoordinatorError::ShutDown)
    );
    assert_eq!(coordinator.get_all_tasks().await.len(), 1);
}

#[tokio::test]
async fn event_stream_follows_task_lifecycle() {
    use tokio_stream::StreamExt;

    let coordinator = Coordinator::builder()
        .agent(AgentDefinition::new("g", "G").with_capability("general"))
        .build()
        .unwrap();
    let mut events = Box::pin(coordinator.events());

    let id = coordinator.submit_task("noop", Priority::Low, json!({})).await.unwrap();
    let mut kinds = Vec::new();
    while kinds.len() < 3 {
        let event = tokio::time::timeout(WAIT, events.next()).await.unwrap().unwrap();
        assert_eq!(event.task.id, id);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            TaskEventKind::Submitted,
            TaskEventKind::Started,
            TaskEventKind::Completed
        ]
    );
}

#[tokio::test]
async fn summary_counts_statuses() {
    let coordinator = Coordinator::builder()
        .agents(builtin::default_agents())
        .handlers(builtin::handlers())
        .build()
        .unwrap();

    let ok = coordinator
        .submit_task("grade_quiz", Priority::Low, json!({"answers": ["a"], "answerKey": ["a"]}))
        .await
        .unwrap();
    let bad = coordinator
        .submit_task("grade_quiz", Priority::Low, json!({}))
        .await
        .unwrap();
    await_ok(&coordinator, &ok).await;
    assert!(tokio::time::timeout(WAIT, coordinator.await_task(&bad)).await.unwrap().is_err());

    let summary = coordinator.summary().await;
    assert_eq!(summary.tasks[&TaskStatus::Completed], 1);
    assert_eq!(summary.tasks[&TaskStatus::Failed], 1);
    assert_eq!(summary.agents[&AgentStatus::Idle], builtin::default_agents().len());
    assert_eq!(coordinator.get_all_tasks().await.len(), 2);
}
