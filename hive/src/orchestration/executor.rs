//! Task execution backends
//!
//! The scheduler hands each planned task to a [`TaskExecutor`]. What actually
//! fulfils the work (a model call, a subprocess, a simulation) is opaque to
//! the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::agents::AgentRecord;
use crate::config::ExecutorConfig;
use crate::specification::TaskDefinition;

/// Successful executor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub output: String,
    pub tokens_used: u64,
}

impl TaskOutput {
    pub fn new(output: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            output: output.into(),
            tokens_used,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// The work itself failed; the agent stays usable
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// The agent cannot take work until it is reset
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskDefinition, agent: &AgentRecord) -> Result<TaskOutput, ExecutorError>;

    fn name(&self) -> &str {
        "executor"
    }
}

/// Executor that sleeps for a random delay and succeeds with a fixed probability
pub struct SimulatedExecutor {
    config: ExecutorConfig,
}

impl SimulatedExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &TaskDefinition, agent: &AgentRecord) -> Result<TaskOutput, ExecutorError> {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);

        let (delay_ms, succeeded, tokens) = {
            let mut rng = rand::rng();
            (
                rng.random_range(min..=max),
                rng.random_bool(self.config.success_rate.clamp(0.0, 1.0)),
                rng.random_range(200..=2000u64),
            )
        };

        trace!(task_id = %task.id, agent_id = %agent.id, delay_ms, "Simulating task");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if succeeded {
            Ok(TaskOutput::new(
                format!("{} completed {} task {}: {}", agent.name, task.task_type, task.id, task.description),
                tokens,
            ))
        } else {
            Err(ExecutorError::TaskFailed(format!(
                "simulated failure of {} task {}",
                task.task_type, task.id
            )))
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
