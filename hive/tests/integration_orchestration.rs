//! Integration tests for the orchestrator
//!
//! Drive full specification runs through a scripted executor and check
//! ordering, skipping, agent lifecycle, memory side effects and events.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;

use common::*;
use hive::agents::{AgentStatus, AgentType};
use hive::config::OrchestrationMode;
use hive::coordination::HiveEvent;
use hive::memory::MemoryCategory;
use hive::monitoring::HealthStatus;
use hive::orchestration::OrchestrationError;
use hive::specification::{
    parse_specification, ExecutionStrategy, Specification, TaskDefinition, TaskRunStatus, TaskType,
};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<HiveEvent>) -> Vec<HiveEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    events
}

#[tokio::test]
async fn test_dependency_order_with_reversed_input() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Sequential)).await;

    let spec = Specification::new("reversed", "Reversed input")
        .with_task(TaskDefinition::new("c", TaskType::Testing, "Test").depends_on("b"))
        .with_task(TaskDefinition::new("b", TaskType::Implementation, "Build").depends_on("a"))
        .with_task(TaskDefinition::new("a", TaskType::Design, "Design"));

    let result = hive.orchestrate_specification(&spec).await.unwrap();
    assert!(result.success);
    assert_eq!(result.strategy, ExecutionStrategy::Sequential);
    assert_eq!(executor.executed(), vec!["a", "b", "c"]);
    assert_eq!(result.metrics.tasks_succeeded, 3);
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let executor = Arc::new(ScriptedExecutor::new().failing("a"));
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Sequential)).await;

    let spec = Specification::new("chain", "Chain")
        .with_task(TaskDefinition::new("c", TaskType::Testing, "Test").depends_on("b"))
        .with_task(TaskDefinition::new("b", TaskType::Implementation, "Build").depends_on("a"))
        .with_task(TaskDefinition::new("a", TaskType::Design, "Design"));

    let result = hive.orchestrate_specification(&spec).await.unwrap();
    assert!(!result.success);
    assert_eq!(executor.executed(), vec!["a"]);

    assert_eq!(result.outcome("a").unwrap().status, TaskRunStatus::Failed);
    for id in ["b", "c"] {
        let outcome = result.outcome(id).unwrap();
        assert_eq!(outcome.status, TaskRunStatus::Skipped);
        assert!(outcome.result.is_none());
        assert!(outcome.reason.is_some());
    }
    assert!(result.output.contains("[a] FAILED:"));

    // Skipped tasks release their reserved load
    let balancer = hive.load_balancer().await.unwrap();
    assert_eq!(balancer.get_load_balancing_metrics().active_tasks, 0);
}

#[tokio::test]
async fn test_implementation_failure_halts_sequence() {
    let executor = Arc::new(ScriptedExecutor::new().failing("build"));
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Sequential)).await;

    let spec = Specification::new("halt", "Halt")
        .with_task(TaskDefinition::new("build", TaskType::Implementation, "Build"))
        .with_task(TaskDefinition::new("docs", TaskType::Review, "Independent review"));

    let result = hive.orchestrate_specification(&spec).await.unwrap();
    assert_eq!(executor.executed(), vec!["build"]);
    assert_eq!(result.outcome("docs").unwrap().status, TaskRunStatus::Skipped);
    assert_eq!(result.metrics.tasks_failed, 1);
    assert_eq!(result.metrics.tasks_skipped, 1);
}

#[tokio::test]
async fn test_waves_run_independent_tasks() {
    let executor = Arc::new(ScriptedExecutor::new().failing("left"));
    let hive = start_hive(
        executor.clone(),
        test_config(OrchestrationMode::ParallelWithDependencies),
    )
    .await;

    let spec = Specification::new("waves", "Waves")
        .with_task(TaskDefinition::new("left", TaskType::Design, "Left"))
        .with_task(TaskDefinition::new("right", TaskType::Design, "Right"))
        .with_task(TaskDefinition::new("after-right", TaskType::Testing, "Check").depends_on("right"))
        .with_task(
            TaskDefinition::new("join", TaskType::Implementation, "Join")
                .depends_on("left")
                .depends_on("right"),
        );

    let result = hive.orchestrate_specification(&spec).await.unwrap();
    assert_eq!(result.strategy, ExecutionStrategy::ParallelWithDependencies);

    let executed = executor.executed();
    assert_eq!(executed.len(), 3);
    assert!(executed.contains(&"right".to_string()));
    assert!(executed.contains(&"after-right".to_string()));
    assert!(!executed.contains(&"join".to_string()));

    assert_eq!(result.outcome("after-right").unwrap().status, TaskRunStatus::Succeeded);
    assert_eq!(result.outcome("join").unwrap().status, TaskRunStatus::Skipped);
    assert!(!result.success);
}

#[tokio::test]
async fn test_parallel_ignores_dependencies() {
    let executor = Arc::new(ScriptedExecutor::new().failing("task-001"));
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Parallel)).await;

    let result = hive.orchestrate_specification(&default_chain("parallel")).await.unwrap();
    assert_eq!(result.strategy, ExecutionStrategy::Parallel);
    assert_eq!(executor.executed().len(), 3);
    assert_eq!(result.metrics.tasks_failed, 1);
    assert_eq!(result.metrics.tasks_succeeded, 2);
    assert_eq!(result.metrics.tasks_skipped, 0);
}

#[tokio::test]
async fn test_cycle_is_rejected_before_execution() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Adaptive)).await;

    let spec = Specification::new("cycle", "Cycle")
        .with_task(TaskDefinition::new("a", TaskType::Design, "A").depends_on("b"))
        .with_task(TaskDefinition::new("b", TaskType::Design, "B").depends_on("a"));

    let err = hive.orchestrate_specification(&spec).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::CycleDetected { .. }));
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn test_missing_agent_types_are_spawned() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;
    let before = hive.get_active_agents().await.unwrap().len();

    let spec = chain_spec(
        "spawned",
        [AgentType::Reviewer, AgentType::Optimizer, AgentType::Researcher],
    );
    let result = hive.orchestrate_specification(&spec).await.unwrap();

    assert!(result.success);
    assert_eq!(result.agents_used.len(), 3);

    let agents = hive.get_active_agents().await.unwrap();
    assert_eq!(agents.len(), before + 3);
    for agent_type in [AgentType::Reviewer, AgentType::Optimizer, AgentType::Researcher] {
        assert!(agents.iter().any(|a| a.agent_type == agent_type));
    }
    assert!(agents.iter().all(|a| a.status == AgentStatus::Idle));
}

#[tokio::test]
async fn test_full_pool_falls_back_to_overflow() {
    let mut config = test_config(OrchestrationMode::Sequential);
    config.orchestrator.seed_pool.clear();
    config.orchestrator.max_agents = 1;

    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, config).await;
    let coordinator = hive.coordinator_id().await.unwrap();

    assert!(matches!(
        hive.spawn_specialized_agent(AgentType::Coder, None).await,
        Err(OrchestrationError::CapacityExceeded { requested: 2, limit: 1 })
    ));

    let result = hive.orchestrate_specification(&default_chain("overflow")).await.unwrap();
    assert!(result.success);
    assert_eq!(result.agents_used, vec![coordinator]);
}

#[tokio::test]
async fn test_capacity_parks_and_reactivates() {
    let mut config = test_config(OrchestrationMode::Sequential);
    config.orchestrator.max_agents = config.orchestrator.seed_size() + 1;

    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, config).await;
    let mut events = hive.subscribe();

    let reviewer = hive.spawn_specialized_agent(AgentType::Reviewer, None).await.unwrap();
    let dormant = hive.get_dormant_agents().await.unwrap();
    assert_eq!(dormant.len(), 1);
    assert!(!dormant[0].is_coordinator());
    assert_eq!(hive.get_active_agents().await.unwrap().len(), 6);

    let parked = dormant[0].id.clone();
    let balancer = hive.load_balancer().await.unwrap();
    assert!(balancer.agent_load(&parked).is_none());
    assert!(balancer.agent_load(&reviewer.id).is_some());

    let (agent, context) = hive.reactivate_agent(&parked).await.unwrap();
    assert_eq!(agent.id, parked);
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(context.agent_id, parked);
    assert_eq!(hive.get_active_agents().await.unwrap().len(), 6);
    assert_eq!(hive.get_dormant_agents().await.unwrap().len(), 1);

    assert!(matches!(
        hive.reactivate_agent(&parked).await,
        Err(OrchestrationError::InvalidRequest(_))
    ));

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(e, HiveEvent::AgentDormant { agent_id } if agent_id == &parked)));
    assert!(events.iter().any(|e| matches!(e, HiveEvent::AgentReactivated { agent_id } if agent_id == &parked)));
}

#[tokio::test]
async fn test_terminate_agent() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;

    let agent = hive.spawn_specialized_agent(AgentType::Analyst, None).await.unwrap();
    hive.terminate_agent(&agent.id).await.unwrap();
    assert!(hive.get_active_agents().await.unwrap().iter().all(|a| a.id != agent.id));
    assert!(matches!(
        hive.terminate_agent(&agent.id).await,
        Err(OrchestrationError::AgentNotFound(_))
    ));

    let coordinator = hive.coordinator_id().await.unwrap();
    assert!(matches!(
        hive.terminate_agent(&coordinator).await,
        Err(OrchestrationError::ProtectedAgent(_))
    ));
}

#[tokio::test]
async fn test_resubmitted_specification_is_stored_once() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;

    let spec = default_chain("payments-v1");
    hive.orchestrate_specification(&spec).await.unwrap();
    hive.orchestrate_specification(&spec).await.unwrap();

    let hits = hive.query_memory_bank("payments-v1", 100).await.unwrap();
    let specs = hits
        .iter()
        .filter(|h| h.category == MemoryCategory::Specification)
        .count();
    let results = hits
        .iter()
        .filter(|h| h.category == MemoryCategory::ExecutionResult)
        .count();
    assert_eq!(specs, 1);
    assert_eq!(results, 2);

    // Distinct (specification, task) pairs
    assert_eq!(hive.get_completed_task_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_clear_memory_bank_resets_counts() {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, file_config(dir.path(), OrchestrationMode::Sequential)).await;

    hive.orchestrate_specification(&default_chain("to-clear")).await.unwrap();
    assert_eq!(hive.get_completed_task_count().await.unwrap(), 3);

    hive.clear_memory_bank().await.unwrap();
    assert_eq!(hive.get_completed_task_count().await.unwrap(), 0);
    assert!(hive.query_memory_bank("to-clear", 10).await.unwrap().is_empty());

    // Agents were re-recorded, so new executions keep valid references
    hive.orchestrate_specification(&default_chain("after-clear")).await.unwrap();
    assert_eq!(hive.check_health().await.status, HealthStatus::Healthy);
    assert!(dir.path().join("memory.json").exists());
}

#[tokio::test]
async fn test_malformed_text_uses_default_plan() {
    let spec = parse_specification("just some notes without any structure");
    let ids: Vec<&str> = spec.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["task-001", "task-002", "task-003"]);
    let types: Vec<AgentType> = spec.tasks.iter().map(|t| t.assigned_agent_type).collect();
    assert_eq!(types, vec![AgentType::Architect, AgentType::Coder, AgentType::Tester]);

    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor.clone(), test_config(OrchestrationMode::Sequential)).await;
    let result = hive.orchestrate_specification(&spec).await.unwrap();
    assert!(result.success);
    assert_eq!(executor.executed(), vec!["task-001", "task-002", "task-003"]);
}

#[tokio::test]
async fn test_events_follow_run_lifecycle() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = hive::Orchestrator::new(executor);
    let mut rx = hive.subscribe();
    hive.initialize(test_config(OrchestrationMode::Sequential)).await.unwrap();

    hive.orchestrate_specification(&default_chain("events")).await.unwrap();
    hive.shutdown().await.unwrap();

    let events = drain(&mut rx);
    let position = |pred: &dyn Fn(&HiveEvent) -> bool| events.iter().position(|e| pred(e));

    let initialized = position(&|e| matches!(e, HiveEvent::HiveInitialized { agent_count: 6, .. })).unwrap();
    let started = position(&|e| matches!(e, HiveEvent::SpecificationStarted { .. })).unwrap();
    let completed = position(&|e| {
        matches!(e, HiveEvent::SpecificationCompleted { success: true, .. })
    })
    .unwrap();
    let shutdown = position(&|e| matches!(e, HiveEvent::HiveShutdown)).unwrap();
    assert!(initialized < started && started < completed && completed < shutdown);

    let assigned = events.iter().filter(|e| matches!(e, HiveEvent::TaskAssigned { .. })).count();
    let finished = events.iter().filter(|e| matches!(e, HiveEvent::TaskCompleted { .. })).count();
    assert_eq!(assigned, 3);
    assert_eq!(finished, 3);

    assert!(!hive.is_initialized().await);
    assert!(matches!(
        hive.orchestrate_specification(&default_chain("late")).await,
        Err(OrchestrationError::NotInitialized { .. })
    ));
}

#[tokio::test]
async fn test_unavailable_agent_degrades_health() {
    let executor = Arc::new(ScriptedExecutor::new().unavailable("task-001"));
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;

    let result = hive.orchestrate_specification(&default_chain("crash")).await.unwrap();
    let failed = result.outcome("task-001").unwrap();
    assert_eq!(failed.status, TaskRunStatus::Failed);

    let balancer = hive.load_balancer().await.unwrap();
    assert!(!balancer.agent_load(&failed.agent_id).unwrap().available);

    let report = hive.check_health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.issues[0].contains(failed.agent_id.as_str()));
    assert_eq!(hive.get_hive_status().await.health.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_agent_terminated_mid_task_fails_cleanly() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .unavailable("task-001")
            .delayed("task-001", Duration::from_millis(200)),
    );
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;
    let mut rx = hive.subscribe();

    let spec = default_chain("vanish");
    let (result, agent_id) = tokio::join!(hive.orchestrate_specification(&spec), async {
        let agent_id = loop {
            match rx.recv().await.unwrap() {
                HiveEvent::TaskStarted { task_id, agent_id } if task_id == "task-001" => break agent_id,
                _ => continue,
            }
        };
        hive.terminate_agent(&agent_id).await.unwrap();
        agent_id
    });

    let result = result.unwrap();
    assert_eq!(result.outcome("task-001").unwrap().status, TaskRunStatus::Failed);
    assert_eq!(result.outcome("task-002").unwrap().status, TaskRunStatus::Skipped);

    let balancer = hive.load_balancer().await.unwrap();
    assert!(balancer.agent_load(&agent_id).is_none());
    assert!(hive.get_active_agents().await.unwrap().iter().all(|a| a.id != agent_id));
}

#[tokio::test(start_paused = true)]
async fn test_slow_task_times_out() {
    let mut config = test_config(OrchestrationMode::Sequential);
    config.orchestrator.task_timeout_secs = 1;

    let executor = Arc::new(ScriptedExecutor::new().delayed("task-001", Duration::from_secs(5)));
    let hive = start_hive(executor, config).await;

    let result = hive.orchestrate_specification(&default_chain("slow")).await.unwrap();
    let outcome = result.outcome("task-001").unwrap();
    assert_eq!(outcome.status, TaskRunStatus::Failed);
    let error = outcome.result.as_ref().and_then(|r| r.error.clone()).unwrap();
    assert!(error.contains("timed out"));
    assert_eq!(result.outcome("task-002").unwrap().status, TaskRunStatus::Skipped);
}

#[tokio::test]
async fn test_hive_status_reports_pool_and_work() {
    let executor = Arc::new(ScriptedExecutor::new());
    let hive = start_hive(executor, test_config(OrchestrationMode::Sequential)).await;
    hive.orchestrate_specification(&default_chain("status")).await.unwrap();

    let status = hive.get_hive_status().await;
    assert!(status.initialized);
    assert_eq!(status.active_agents, 6);
    assert_eq!(status.total_agents, 6);
    assert_eq!(status.active_tasks, 0);
    assert_eq!(status.completed_tasks, 3);
    assert!((status.performance.success_rate - 1.0).abs() < 1e-9);
    assert!(status.performance.memory_usage > 0);
}
