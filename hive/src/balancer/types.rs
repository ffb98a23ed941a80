//! Load table records and balancer results

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AgentId, AgentRecord, AgentType, affinity_table};
use crate::specification::{Priority, TaskDefinition, TaskType};

/// Response time the reliability curve is centred on
const RELIABILITY_TARGET_MS: f64 = 3000.0;

/// Performance view kept per agent by the balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPerformance {
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub token_efficiency: f64,
    pub accuracy: f64,
    pub reliability: f64,
    /// Affinity per task type (0.0 - 1.0)
    pub specialization: HashMap<TaskType, f64>,
}

impl LoadPerformance {
    pub fn reliability_for(success_rate: f64, average_response_time_ms: f64) -> f64 {
        let response_penalty = (average_response_time_ms - RELIABILITY_TARGET_MS).abs() / 10_000.0;
        0.7 * success_rate + 0.3 * (1.0 - response_penalty).max(0.0)
    }

    pub fn specialization_for(&self, task_type: TaskType) -> f64 {
        self.specialization
            .get(&task_type)
            .copied()
            .unwrap_or(crate::agents::DEFAULT_AFFINITY)
    }
}

/// Load state of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLoad {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    /// In-flight task count
    pub current_load: u32,
    pub max_capacity: u32,
    pub utilization_rate: f64,
    /// Assigned but not yet started
    pub queued_tasks: u32,
    pub average_task_duration_ms: f64,
    pub capabilities: BTreeSet<String>,
    pub performance: LoadPerformance,
    /// Excluded from ranking when false
    pub available: bool,
    pub last_assigned: Option<DateTime<Utc>>,
}

impl AgentLoad {
    pub fn from_agent(agent: &AgentRecord) -> Self {
        let perf = &agent.performance;
        let scale = 0.5 + 0.5 * perf.success_rate.clamp(0.0, 1.0);
        let max_capacity = ((agent.agent_type.base_capacity() as f64) * scale).round().max(1.0) as u32;

        Self {
            agent_id: agent.id.clone(),
            agent_type: agent.agent_type,
            current_load: 0,
            max_capacity,
            utilization_rate: 0.0,
            queued_tasks: 0,
            average_task_duration_ms: perf.average_response_time_ms,
            capabilities: agent.capabilities.clone(),
            performance: LoadPerformance {
                success_rate: perf.success_rate,
                average_response_time_ms: perf.average_response_time_ms,
                token_efficiency: perf.token_efficiency,
                accuracy: perf.accuracy,
                reliability: LoadPerformance::reliability_for(
                    perf.success_rate,
                    perf.average_response_time_ms,
                ),
                specialization: affinity_table(agent.agent_type),
            },
            available: true,
            last_assigned: None,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_capacity
    }

    pub fn refresh_utilization(&mut self) {
        self.utilization_rate = utilization(self.current_load, self.max_capacity);
    }
}

pub(crate) fn utilization(load: u32, capacity: u32) -> f64 {
    load as f64 / capacity.max(1) as f64
}

/// What the balancer needs to know about a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Unique key for this assignment
    pub task_id: String,
    pub task_type: TaskType,
    pub priority: Priority,
    /// Restrict candidates to one agent type
    pub agent_type: Option<AgentType>,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            priority: Priority::Medium,
            agent_type: None,
        }
    }

    /// Request for a specification task, keyed by `key` and restricted to its assigned agent type
    pub fn for_task(key: impl Into<String>, task: &TaskDefinition, priority: Priority) -> Self {
        Self {
            task_id: key.into(),
            task_type: task.task_type,
            priority,
            agent_type: Some(task.assigned_agent_type),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }
}

/// Placement of a task on an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: String,
    pub agent_id: AgentId,
    pub estimated_duration_ms: u64,
    /// Composite score of the chosen agent (0.0 - 1.0)
    pub confidence: f64,
    pub reasoning: String,
}

/// One synthetic load move performed by a rebalance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTransfer {
    pub from: AgentId,
    pub to: AgentId,
    pub units: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    /// False when variance was already under the threshold
    pub triggered: bool,
    pub variance_before: f64,
    pub variance_after: f64,
    pub transfers: Vec<LoadTransfer>,
}

impl RebalanceReport {
    pub fn is_noop(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancingMetrics {
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub queued_tasks: u64,
    pub average_wait_time_ms: f64,
    pub load_variance: f64,
    /// Completed tasks per second since the balancer started
    pub throughput: f64,
    pub efficiency: f64,
    pub average_utilization: f64,
}

/// Population standard deviation of utilization rates
pub fn load_variance(utilizations: &[f64]) -> f64 {
    if utilizations.is_empty() {
        return 0.0;
    }

    let n = utilizations.len() as f64;
    let mean = utilizations.iter().sum::<f64>() / n;
    let variance = utilizations.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
