//! Unit tests for the load balancer
//!
//! Covers capacity bounds, scoring order, rebalancing and metrics, with
//! property tests over random assignment sequences.

use hive::agents::{AgentRecord, AgentType};
use hive::balancer::{BalancerError, LoadBalancer, TaskRequest};
use hive::config::LoadBalancerConfig;
use hive::specification::{Priority, TaskType};
use proptest::prelude::*;

const TASK_TYPES: [TaskType; 5] = TaskType::ALL;

const AGENT_TYPES: [AgentType; 6] = [
    AgentType::Architect,
    AgentType::Coder,
    AgentType::Tester,
    AgentType::Reviewer,
    AgentType::Optimizer,
    AgentType::Researcher,
];

fn pool(types: &[AgentType]) -> (LoadBalancer, Vec<AgentRecord>) {
    let agents: Vec<AgentRecord> = types.iter().map(|t| AgentRecord::new(*t, None)).collect();
    let balancer = LoadBalancer::new(LoadBalancerConfig::default());
    balancer.initialize_agents(&agents);
    (balancer, agents)
}

#[test]
fn test_empty_balancer_has_no_candidates() {
    let balancer = LoadBalancer::new(LoadBalancerConfig::default());
    let err = balancer
        .assign_task(&TaskRequest::new("t", TaskType::Design))
        .unwrap_err();
    assert!(matches!(err, BalancerError::NoSuitableAgent { .. }));
    assert!(balancer.predict_optimal_assignment(&TaskRequest::new("t", TaskType::Design)).is_empty());
}

#[test]
fn test_unavailable_agent_is_skipped() {
    let (balancer, agents) = pool(&[AgentType::Tester, AgentType::Tester]);
    balancer.set_availability(&agents[0].id, false).unwrap();

    for i in 0..3 {
        let assignment = balancer
            .assign_task(&TaskRequest::new(format!("t{}", i), TaskType::Testing))
            .unwrap();
        assert_eq!(assignment.agent_id, agents[1].id);
    }
}

#[test]
fn test_removed_agent_rejects_availability_change() {
    let (balancer, agents) = pool(&[AgentType::Coder]);
    assert!(balancer.remove_agent(&agents[0].id).is_some());
    assert_eq!(balancer.agent_count(), 0);
    assert!(matches!(
        balancer.set_availability(&agents[0].id, true),
        Err(BalancerError::AgentNotFound(_))
    ));
}

#[test]
fn test_assignment_confidence_is_normalized() {
    let (balancer, _) = pool(&AGENT_TYPES);
    for task_type in TASK_TYPES {
        let request = TaskRequest::new(format!("{:?}", task_type), task_type).with_priority(Priority::Critical);
        let assignment = balancer.assign_task(&request).unwrap();
        assert!((0.0..=1.0).contains(&assignment.confidence));
        assert!(!assignment.reasoning.is_empty());
    }
}

#[test]
fn test_metrics_track_lifecycle() {
    let (balancer, agents) = pool(&[AgentType::Coder, AgentType::Tester]);
    balancer.assign_task(&TaskRequest::new("a", TaskType::Implementation)).unwrap();
    balancer.assign_task(&TaskRequest::new("b", TaskType::Testing)).unwrap();

    let metrics = balancer.get_load_balancing_metrics();
    assert_eq!(metrics.total_tasks, 2);
    assert_eq!(metrics.active_tasks, 2);
    assert_eq!(metrics.queued_tasks, 2);

    balancer.mark_started("a");
    balancer.complete_task("a", &agents[0].id, true, 500).unwrap();

    let metrics = balancer.get_load_balancing_metrics();
    assert_eq!(metrics.active_tasks, 1);
    assert_eq!(metrics.queued_tasks, 1);
    assert!(metrics.efficiency >= 0.0);
}

#[test]
fn test_overflow_ignores_capacity() {
    let (balancer, agents) = pool(&[AgentType::Optimizer]);
    let capacity = balancer.agent_load(&agents[0].id).unwrap().max_capacity;

    for i in 0..capacity + 2 {
        let request = TaskRequest::new(format!("o{}", i), TaskType::Optimization);
        balancer.assign_overflow(&request).unwrap();
    }

    let load = balancer.agent_load(&agents[0].id).unwrap();
    assert_eq!(load.current_load, capacity + 2);
    assert!(load.utilization_rate > 1.0);
}

#[test]
fn test_rebalance_settles_in_one_call() {
    let (balancer, agents) = pool(&[AgentType::Coder, AgentType::Coder, AgentType::Coder]);

    balancer.set_availability(&agents[1].id, false).unwrap();
    balancer.set_availability(&agents[2].id, false).unwrap();
    for i in 0..12 {
        let request = TaskRequest::new(format!("o{}", i), TaskType::Implementation);
        balancer.assign_overflow(&request).unwrap();
    }
    balancer.set_availability(&agents[1].id, true).unwrap();
    balancer.set_availability(&agents[2].id, true).unwrap();

    let first = balancer.rebalance_load();
    assert!(first.triggered);
    assert!(first.transfers.len() >= 2);
    assert!(first.variance_after < first.variance_before);

    let settled: Vec<u32> = agents
        .iter()
        .map(|a| balancer.agent_load(&a.id).unwrap().current_load)
        .collect();
    assert_eq!(settled.iter().sum::<u32>(), 12);

    let second = balancer.rebalance_load();
    assert!(second.transfers.is_empty());
    let after: Vec<u32> = agents
        .iter()
        .map(|a| balancer.agent_load(&a.id).unwrap().current_load)
        .collect();
    assert_eq!(settled, after);
}

proptest! {
    #[test]
    fn prop_regular_assignment_never_exceeds_capacity(
        picks in proptest::collection::vec(0usize..5, 1..60),
    ) {
        let (balancer, _) = pool(&AGENT_TYPES);

        for (i, pick) in picks.iter().enumerate() {
            let request = TaskRequest::new(format!("t{}", i), TASK_TYPES[*pick]);
            let _ = balancer.assign_task(&request);

            for load in balancer.loads() {
                prop_assert!(load.current_load <= load.max_capacity);
            }
        }
    }

    #[test]
    fn prop_rebalance_preserves_total_and_never_raises_variance(
        overflow in 0u32..12,
        regular in 0u32..4,
    ) {
        let (balancer, agents) = pool(&[AgentType::Coder, AgentType::Coder, AgentType::Coder]);

        balancer.set_availability(&agents[1].id, false).unwrap();
        balancer.set_availability(&agents[2].id, false).unwrap();
        for i in 0..overflow {
            let request = TaskRequest::new(format!("o{}", i), TaskType::Implementation);
            balancer.assign_overflow(&request).unwrap();
        }
        balancer.set_availability(&agents[1].id, true).unwrap();
        balancer.set_availability(&agents[2].id, true).unwrap();
        for i in 0..regular {
            let _ = balancer.assign_task(&TaskRequest::new(format!("r{}", i), TaskType::Implementation));
        }

        let total_before: u32 = balancer.loads().iter().map(|l| l.current_load).sum();
        let report = balancer.rebalance_load();
        let total_after: u32 = balancer.loads().iter().map(|l| l.current_load).sum();

        prop_assert_eq!(total_before, total_after);
        prop_assert!(report.variance_after <= report.variance_before + 1e-12);
        for transfer in &report.transfers {
            prop_assert!(transfer.units > 0);
            prop_assert_ne!(&transfer.from, &transfer.to);
        }

        let settled: Vec<u32> = agents
            .iter()
            .map(|a| balancer.agent_load(&a.id).map(|l| l.current_load).unwrap_or(0))
            .collect();
        let second = balancer.rebalance_load();
        let after: Vec<u32> = agents
            .iter()
            .map(|a| balancer.agent_load(&a.id).map(|l| l.current_load).unwrap_or(0))
            .collect();
        prop_assert!(second.transfers.is_empty());
        prop_assert_eq!(settled, after);
    }
}
