//! Hive status reporting

use serde::{Deserialize, Serialize};

use crate::monitoring::HealthReport;

/// Performance figures shown by status surfaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HivePerformance {
    pub tasks_per_second: f64,
    pub average_response_time_ms: f64,
    pub token_efficiency: f64,
    pub success_rate: f64,
    /// Mean load balancer utilization (0.0 - 1.0)
    pub cpu_usage: f64,
    /// Serialized memory store size in bytes
    pub memory_usage: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveStatus {
    pub initialized: bool,
    pub active_agents: usize,
    /// Active plus dormant agents
    pub total_agents: usize,
    pub active_tasks: u64,
    pub completed_tasks: usize,
    pub performance: HivePerformance,
    pub health: HealthReport,
}

impl HiveStatus {
    /// Status of an orchestrator that has not been initialized
    pub fn offline() -> Self {
        Self {
            initialized: false,
            active_agents: 0,
            total_agents: 0,
            active_tasks: 0,
            completed_tasks: 0,
            performance: HivePerformance::default(),
            health: HealthReport::offline(),
        }
    }
}
