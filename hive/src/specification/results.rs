//! Execution results for tasks and whole specifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionStrategy, TaskType};
use crate::agents::AgentId;
use crate::coordination::Topology;

/// Outcome of one executor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            duration_ms,
            tokens_used: 0,
            error: Some(error.into()),
        }
    }
}

/// What happened to a planned task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskRunStatus {
    Succeeded,
    Failed,
    /// Not run because a dependency failed or an implementation failure halted the sequence
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub task_type: TaskType,
    pub agent_id: AgentId,
    pub status: TaskRunStatus,
    /// Present for tasks that were attempted
    pub result: Option<ExecutionResult>,
    /// Why a task was skipped
    pub reason: Option<String>,
}

impl TaskOutcome {
    pub fn attempted(&self) -> bool {
        self.status != TaskRunStatus::Skipped
    }
}

/// Aggregate figures for a specification run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub total_duration_ms: u64,
    pub tokens_used: u64,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
    pub complexity: f64,
}

/// Rolled-up result of orchestrating a specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationResult {
    pub specification_id: String,
    /// True iff every attempted task succeeded
    pub success: bool,
    pub output: String,
    pub task_results: Vec<TaskOutcome>,
    pub agents_used: Vec<AgentId>,
    pub topology: Topology,
    pub strategy: ExecutionStrategy,
    pub metrics: ResultMetrics,
    pub completed_at: DateTime<Utc>,
}

impl SpecificationResult {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.task_results.iter().find(|o| o.task_id == task_id)
    }
}
