//! Memory entry types
//!
//! Every collection is an id-indexed map; cross references between entries
//! are plain ids checked by the health check rather than enforced on write.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AgentId, AgentRecord};
use crate::specification::{Specification, SpecificationResult, TaskType};

/// Lifecycle of a stored specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecificationStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationEntry {
    pub specification: Specification,
    pub status: SpecificationStatus,
    pub stored_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored specification result, linked to its specification by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResultEntry {
    pub id: String,
    pub specification_id: String,
    pub result: SpecificationResult,
    pub timestamp: DateTime<Utc>,
}

/// One task an agent worked on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInteraction {
    pub task_id: String,
    pub task_type: TaskType,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Agent snapshot taken at creation plus its interaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub agent: AgentRecord,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub interactions: Vec<AgentInteraction>,
    /// Running mean over every recorded task execution
    pub success_rate: f64,
    #[serde(default)]
    pub tasks_recorded: u64,
}

impl AgentEntry {
    pub fn new(agent: AgentRecord) -> Self {
        Self {
            created_at: agent.created_at,
            success_rate: agent.performance.success_rate,
            agent,
            interactions: Vec::new(),
            tasks_recorded: 0,
        }
    }

    pub(crate) fn record_interaction(&mut self, interaction: AgentInteraction) {
        let outcome = if interaction.success { 1.0 } else { 0.0 };
        let n = self.tasks_recorded as f64;
        self.success_rate = (self.success_rate * n + outcome) / (n + 1.0);
        self.tasks_recorded += 1;
        self.interactions.push(interaction);
    }
}

/// Record of one executor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub id: String,
    pub task_id: String,
    pub task_type: TaskType,
    pub agent_id: AgentId,
    pub specification_id: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub output: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskExecutionRecord {
    pub fn new(task_id: impl Into<String>, task_type: TaskType, agent_id: AgentId, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            task_type,
            agent_id,
            specification_id: None,
            success,
            duration_ms: 0,
            tokens_used: 0,
            output: String::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_specification(mut self, specification_id: impl Into<String>) -> Self {
        self.specification_id = Some(specification_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub(crate) fn interaction(&self) -> AgentInteraction {
        AgentInteraction {
            task_id: self.task_id.clone(),
            task_type: self.task_type,
            success: self.success,
            duration_ms: self.duration_ms,
            timestamp: self.timestamp,
        }
    }
}

/// Recent history of an agent, captured when it is parked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: AgentId,
    /// Newest first
    pub recent_interactions: Vec<AgentInteraction>,
    /// Newest first
    pub recent_tasks: Vec<TaskExecutionRecord>,
}

impl AgentContext {
    pub fn empty(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            recent_interactions: Vec::new(),
            recent_tasks: Vec::new(),
        }
    }
}

/// Collection an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Specification,
    ExecutionResult,
    Agent,
    TaskExecution,
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Specification => "specification",
            Self::ExecutionResult => "execution_result",
            Self::Agent => "agent",
            Self::TaskExecution => "task_execution",
        };
        write!(f, "{}", name)
    }
}

/// Ranked query match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub category: MemoryCategory,
    pub id: String,
    /// Number of query occurrences in the serialized entry
    pub score: usize,
    pub entry: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySize {
    pub specifications: usize,
    pub execution_results: usize,
    pub agents: usize,
    pub task_executions: usize,
    /// Size of the serialized document
    pub bytes: u64,
}

impl MemorySize {
    pub fn total_entries(&self) -> usize {
        self.specifications + self.execution_results + self.agents + self.task_executions
    }
}

/// Problem found by the store health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryIssue {
    NotInitialized,
    StorageUnreachable { path: String, reason: String },
    Oversized { bytes: u64, limit: u64 },
    OrphanedReference {
        category: MemoryCategory,
        id: String,
        missing: String,
    },
}

impl fmt::Display for MemoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "memory store not initialized"),
            Self::StorageUnreachable { path, reason } => {
                write!(f, "storage unreachable at {}: {}", path, reason)
            }
            Self::Oversized { bytes, limit } => {
                write!(f, "memory store size {} bytes exceeds limit of {} bytes", bytes, limit)
            }
            Self::OrphanedReference { category, id, missing } => {
                write!(f, "{} {} references missing {}", category, id, missing)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHealth {
    pub healthy: bool,
    pub issues: Vec<MemoryIssue>,
    pub checked_at: DateTime<Utc>,
}

impl MemoryHealth {
    pub fn from_issues(issues: Vec<MemoryIssue>) -> Self {
        Self {
            healthy: issues.is_empty(),
            issues,
            checked_at: Utc::now(),
        }
    }
}

/// Entries removed by a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub execution_results: usize,
    pub task_executions: usize,
    pub interactions: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.execution_results + self.task_executions + self.interactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentType;

    #[test]
    fn test_rolling_success_rate() {
        let agent = AgentRecord::new(AgentType::Coder, None);
        let id = agent.id.clone();
        let mut entry = AgentEntry::new(agent);

        let ok = TaskExecutionRecord::new("t1", TaskType::Implementation, id.clone(), true);
        let failed = TaskExecutionRecord::new("t2", TaskType::Implementation, id, false);
        entry.record_interaction(ok.interaction());
        entry.record_interaction(failed.interaction());

        assert_eq!(entry.tasks_recorded, 2);
        assert_eq!(entry.interactions.len(), 2);
        assert!((entry.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_issue_display() {
        let issue = MemoryIssue::OrphanedReference {
            category: MemoryCategory::TaskExecution,
            id: "abc".to_string(),
            missing: "agent coder-1".to_string(),
        };
        assert_eq!(issue.to_string(), "task_execution abc references missing agent coder-1");
    }
}
