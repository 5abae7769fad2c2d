//! End-to-end orchestration test.
//!
//! Drives a decomposed task through assignment, completion and a review
//! vote while lifecycle and status events flow over the bus, then checks
//! crash recovery through the process orchestrator.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmforge_core::{MessageType, SwarmError, SwarmMessage};
use swarmforge_orchestrator::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn task_message(sender: &str, task: &SubTask) -> SwarmMessage {
    SwarmMessage::new(
        MessageType::TaskResult,
        sender,
        serde_json::json!({ "task_id": task.id, "description": task.description }),
    )
}

fn position(order: &[uuid::Uuid], id: uuid::Uuid) -> usize {
    order.iter().position(|x| *x == id).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Decompose -> assign -> complete -> review vote
// ---------------------------------------------------------------------------

#[test]
fn full_pipeline_runs_to_completion() {
    let config = SwarmConfig::default();
    let pool = config.build_pool();
    let bus = config.build_bus();
    let engine = ConsensusEngine::new(ConsensusStrategy::Weighted);

    let completed = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&completed);
    bus.subscribe("dashboard", "task.#", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let mut graph = TaskGraph::from_tasks(decompose(
        "Design, implement, test and review a token bucket rate limiter",
    ));
    assert_eq!(graph.total_count(), 4);
    assert!(!graph.has_cycle());

    // Drive the chain one ready task at a time.
    while !graph.is_done() {
        let assigned = pool.assign_ready(&mut graph).unwrap();
        assert_eq!(assigned.len(), 1, "a chain only ever has one ready task");
        for (task_id, agent_id) in assigned {
            graph.mark_running(task_id);
            let task = graph.get(task_id).unwrap().clone();
            assert_eq!(task.assigned_agent.as_deref(), Some(agent_id.as_str()));

            bus.publish("task.completed", task_message(&agent_id, &task));
            graph.mark_completed(task_id);
            assert!(pool.release(&agent_id));
        }
    }

    assert_eq!(graph.completed_count(), 4);
    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(pool.status().active_tasks, 0);

    let result = engine.decide(vec![
        Vote::weighted("reviewer-1", true, 3.0),
        Vote::weighted("tester-1", false, 1.0).with_reason("flaky edge case"),
    ]);
    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.strategy, ConsensusStrategy::Weighted);
    assert_eq!(result.votes.len(), 2);
}

// ---------------------------------------------------------------------------
// 2. Ordering guarantees on hand-written graphs
// ---------------------------------------------------------------------------

#[test]
fn execution_order_covers_every_task_once() {
    let a = SubTask::new("a", AgentRole::Architect);
    let b = SubTask::new("b", AgentRole::Coder).with_dependencies(vec![a.id]);
    let c = SubTask::new("c", AgentRole::Coder).with_dependencies(vec![a.id]);
    let d = SubTask::new("d", AgentRole::Tester).with_dependencies(vec![b.id, c.id]);
    let e = SubTask::new("e", AgentRole::Researcher);
    let batch = vec![d.clone(), e.clone(), c.clone(), b.clone(), a.clone()];

    let order = execution_order(&batch).unwrap();
    assert_eq!(order.len(), batch.len());
    for task in &batch {
        assert_eq!(order.iter().filter(|id| **id == task.id).count(), 1);
        for dep in &task.depends_on {
            assert!(position(&order, *dep) < position(&order, task.id));
        }
    }

    let leaves: Vec<_> = leaf_tasks(&batch).iter().map(|t| t.id).collect();
    assert_eq!(leaves, vec![d.id, e.id]);
}

#[test]
fn three_task_cycle_is_rejected_before_assignment() {
    let mut a = SubTask::new("a", AgentRole::Coder);
    let mut b = SubTask::new("b", AgentRole::Coder);
    let mut c = SubTask::new("c", AgentRole::Coder);
    a.depends_on = vec![c.id];
    b.depends_on = vec![a.id];
    c.depends_on = vec![b.id];

    let pool = AgentPool::with_agents(default_roster());
    let mut graph = TaskGraph::from_tasks(vec![a, b, c]);
    let err = pool.assign_ready(&mut graph).unwrap_err();
    assert!(matches!(err, SwarmError::CyclicDependency { ref tasks } if tasks.len() == 3));
    assert!(!err.is_retryable());
}

// ---------------------------------------------------------------------------
// 3. Capacity exhaustion is distinguishable and recoverable
// ---------------------------------------------------------------------------

#[test]
fn capacity_exhaustion_then_release() {
    let pool = AgentPool::with_agents([SwarmAgent::new("solo", AgentRole::Tester)
        .with_capabilities(["testing"])
        .with_max_concurrent(1)]);

    let mut first = SubTask::new("first", AgentRole::Tester);
    let mut second = SubTask::new("second", AgentRole::Tester);
    pool.assign(&mut first).unwrap();

    let err = pool.assign(&mut second).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(second.status, TaskStatus::Pending);

    pool.release("solo");
    assert_eq!(pool.assign(&mut second).unwrap().agent_id, "solo");

    let mut foreign = SubTask::new("foreign", AgentRole::Coder);
    assert!(!pool.assign(&mut foreign).unwrap_err().is_retryable());
}

// ---------------------------------------------------------------------------
// 4. Bus isolation across topics and failing handlers
// ---------------------------------------------------------------------------

#[test]
fn bus_wildcards_and_isolation() {
    let bus = MessageBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for (name, pattern) in [("star", "task.*"), ("hash", "task.#"), ("review", "review.*")] {
        let seen = Arc::clone(&seen);
        bus.subscribe(name, pattern, move |_| {
            seen.lock().push(name);
            Ok(())
        })
        .unwrap();
    }
    bus.subscribe("broken", "task.completed", |_| {
        Err(SwarmError::Handler("database unavailable".into()))
    })
    .unwrap();

    let msg = SwarmMessage::status("coder-1", serde_json::json!({}));
    assert_eq!(bus.publish("task.completed", msg), 2);
    assert_eq!(*seen.lock(), vec!["star", "hash"]);

    bus.publish("task.tests.failed", SwarmMessage::status("tester-1", serde_json::json!({})));
    assert_eq!(*seen.lock(), vec!["star", "hash", "hash"]);
    assert_eq!(bus.history_len(), 2);
}

// ---------------------------------------------------------------------------
// 5. Liveness, supervision and recovery
// ---------------------------------------------------------------------------

#[test]
fn heartbeat_lifecycle() {
    let monitor = HeartbeatMonitor::new(Duration::from_millis(500));
    let t0 = Instant::now();
    assert_eq!(monitor.check_at("x", t0), HealthStatus::Unknown);
    monitor.beat_at("x", t0);
    assert_eq!(monitor.check_at("x", t0), HealthStatus::Healthy);
    assert_ne!(
        monitor.check_at("x", t0 + Duration::from_secs(1)),
        HealthStatus::Healthy
    );
}

#[test]
fn supervisor_escalates_after_max_restarts() {
    let supervisor = AgentSupervisor::new(RestartStrategy::RestForOne, 2, Duration::from_secs(30));
    for id in ["a1", "a2", "a3"] {
        supervisor.register(id);
    }
    let actions: Vec<_> = (0..3)
        .map(|_| supervisor.on_agent_crash("a2", "oom"))
        .collect();
    assert_eq!(
        actions,
        vec![
            SupervisorAction::Restart,
            SupervisorAction::Restart,
            SupervisorAction::Escalate
        ]
    );
    assert_eq!(supervisor.agents_to_restart("a2"), vec!["a2", "a3"]);
}

#[test]
fn spawn_crash_respawn_keeps_running_count() {
    let bus = Arc::new(MessageBus::new());
    let restarts = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&restarts);
    bus.subscribe("ops", "agent.restarted", move |_| {
        r.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let orch = ProcessOrchestrator::from_config(&SwarmConfig::default()).with_bus(Arc::clone(&bus));
    let id = orch.spawn("Agent", SpawnConfig::default());

    let report = orch.report_crash(&id, "oom").unwrap();
    assert_eq!(report.action, SupervisorAction::Restart);
    assert_eq!(orch.health().running, 1);
    assert_eq!(restarts.load(Ordering::SeqCst), 1);
}

#[test]
fn roster_spawned_from_config_recovers_and_escalates() {
    let config = SwarmConfig::from_toml_str(
        r#"
        [supervisor]
        strategy = "one_for_all"
        max_restarts = 1
        restart_window_secs = 60
        "#,
    )
    .unwrap();
    let orch = ProcessOrchestrator::from_config(&config);
    for agent in config.roster() {
        orch.spawn_named(&agent.agent_id, "Agent", SpawnConfig::from(&agent))
            .unwrap();
    }
    let total = config.roster().len();

    let report = orch.report_crash("coder-1", "oom").unwrap();
    assert_eq!(report.action, SupervisorAction::Restart);
    assert_eq!(report.restarted.len(), total);
    assert_eq!(report.restarted[0], "coder-1");

    let report = orch.report_crash("coder-1", "oom").unwrap();
    assert_eq!(report.action, SupervisorAction::Escalate);
    let health = orch.health();
    assert_eq!(health.crashed, 1);
    assert_eq!(health.running, total - 1);
}
