//! Event bus for host notifications

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::agents::{AgentId, AgentType};
use crate::monitoring::HealthStatus;
use super::Topology;

/// Events published by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HiveEvent {
    #[serde(rename = "hive.initialized")]
    HiveInitialized {
        coordinator_id: AgentId,
        agent_count: usize,
    },

    #[serde(rename = "hive.shutdown")]
    HiveShutdown,

    #[serde(rename = "agent.spawned")]
    AgentSpawned {
        agent_id: AgentId,
        agent_type: AgentType,
    },

    #[serde(rename = "agent.terminated")]
    AgentTerminated { agent_id: AgentId },

    #[serde(rename = "agent.dormant")]
    AgentDormant { agent_id: AgentId },

    #[serde(rename = "agent.reactivated")]
    AgentReactivated { agent_id: AgentId },

    #[serde(rename = "specification.started")]
    SpecificationStarted {
        specification_id: String,
        complexity: f64,
        topology: Topology,
    },

    #[serde(rename = "task.assigned")]
    TaskAssigned {
        task_id: String,
        agent_id: AgentId,
        confidence: f64,
    },

    #[serde(rename = "task.started")]
    TaskStarted { task_id: String, agent_id: AgentId },

    #[serde(rename = "task.completed")]
    TaskCompleted {
        task_id: String,
        agent_id: AgentId,
        duration_ms: u64,
    },

    #[serde(rename = "task.failed")]
    TaskFailed {
        task_id: String,
        agent_id: AgentId,
        error: String,
    },

    #[serde(rename = "task.skipped")]
    TaskSkipped { task_id: String, reason: String },

    #[serde(rename = "specification.completed")]
    SpecificationCompleted {
        specification_id: String,
        success: bool,
        duration_ms: u64,
    },

    #[serde(rename = "health.checked")]
    HealthChecked {
        status: HealthStatus,
        issues: Vec<String>,
    },

    #[serde(rename = "memory.cleared")]
    MemoryCleared,
}

/// Broadcast channel carrying `HiveEvent`s to every subscriber
pub struct EventBus {
    sender: broadcast::Sender<HiveEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Events buffered per subscriber before slow receivers lag
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: HiveEvent) -> usize {
        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "No subscribers for event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HiveEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::OrchestratorConfig::default().event_capacity)
    }
}
