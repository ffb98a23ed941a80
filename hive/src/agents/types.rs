//! Core Agent Types and Data Structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::AgentError;

/// Unique identifier for an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new unique agent ID prefixed with the agent type
    pub fn new(agent_type: AgentType) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", agent_type.as_str(), &suffix[..8]))
    }

    /// Create from string (for deserialization/testing)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Orchestration root; exactly one exists per hive
    Coordinator,

    /// System design and architecture planning
    Architect,

    /// Code generation, modification, and refactoring
    Coder,

    /// Test generation, execution, and validation
    Tester,

    /// Requirements and performance analysis
    Analyst,

    /// Information gathering
    Researcher,

    /// Code review and quality assessment
    Reviewer,

    /// Performance and resource optimization
    Optimizer,
}

impl AgentType {
    pub const ALL: [AgentType; 8] = [
        AgentType::Coordinator,
        AgentType::Architect,
        AgentType::Coder,
        AgentType::Tester,
        AgentType::Analyst,
        AgentType::Researcher,
        AgentType::Reviewer,
        AgentType::Optimizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Architect => "architect",
            Self::Coder => "coder",
            Self::Tester => "tester",
            Self::Analyst => "analyst",
            Self::Researcher => "researcher",
            Self::Reviewer => "reviewer",
            Self::Optimizer => "optimizer",
        }
    }

    /// Cognitive pattern assigned to every agent of this type
    pub fn cognitive_pattern(&self) -> CognitivePattern {
        match self {
            Self::Coordinator => CognitivePattern::Systems,
            Self::Architect => CognitivePattern::Systems,
            Self::Coder => CognitivePattern::Convergent,
            Self::Tester => CognitivePattern::Critical,
            Self::Analyst => CognitivePattern::Critical,
            Self::Researcher => CognitivePattern::Divergent,
            Self::Reviewer => CognitivePattern::Critical,
            Self::Optimizer => CognitivePattern::Lateral,
        }
    }

    /// Model tier the agent type runs on
    pub fn model_tier(&self) -> ModelTier {
        match self {
            Self::Coordinator | Self::Architect => ModelTier::Advanced,
            Self::Coder | Self::Reviewer | Self::Analyst | Self::Optimizer => ModelTier::Standard,
            Self::Tester | Self::Researcher => ModelTier::Fast,
        }
    }

    /// Concurrent task budget before performance scaling
    pub fn base_capacity(&self) -> u32 {
        match self {
            Self::Coordinator => 5,
            Self::Architect => 3,
            Self::Coder => 4,
            Self::Tester => 4,
            Self::Analyst => 3,
            Self::Researcher => 3,
            Self::Reviewer => 3,
            Self::Optimizer => 2,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coordinator" | "queen" => Ok(Self::Coordinator),
            "architect" => Ok(Self::Architect),
            "coder" | "developer" => Ok(Self::Coder),
            "tester" => Ok(Self::Tester),
            "analyst" => Ok(Self::Analyst),
            "researcher" => Ok(Self::Researcher),
            "reviewer" => Ok(Self::Reviewer),
            "optimizer" => Ok(Self::Optimizer),
            other => Err(AgentError::UnknownType(other.to_string())),
        }
    }
}

/// Reasoning style tag attached to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitivePattern {
    Convergent,
    Divergent,
    Lateral,
    Systems,
    Critical,
    Adaptive,
}

/// Backing model class for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Advanced,
    Standard,
    Fast,
}

/// Current status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent is idle and available for work
    Idle,

    /// Agent is currently working on tasks
    Busy,

    /// Agent has failed and needs intervention
    Error,

    /// Agent is registered and reachable but not tracked as idle
    Active,

    /// Agent is unreachable
    Offline,
}

/// Performance record for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// Total tasks completed (successful or not)
    pub tasks_completed: u64,

    /// Success rate (0.0 - 1.0)
    pub success_rate: f64,

    /// Average response time in milliseconds
    pub average_response_time_ms: f64,

    /// Output produced per token spent (0.0 - 1.0)
    pub token_efficiency: f64,

    /// Accuracy of produced work (0.0 - 1.0)
    pub accuracy: f64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            success_rate: 0.8,
            average_response_time_ms: 3000.0,
            token_efficiency: 0.8,
            accuracy: 0.8,
        }
    }
}

impl AgentPerformance {
    /// Fold one task outcome into the record using an exponential moving average
    pub fn record(&mut self, success: bool, duration_ms: u64, alpha: f64) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.tasks_completed += 1;
        self.success_rate = (1.0 - alpha) * self.success_rate + alpha * outcome;
        self.average_response_time_ms =
            (1.0 - alpha) * self.average_response_time_ms + alpha * duration_ms as f64;
    }
}

/// Full record of a registered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub cognitive_pattern: CognitivePattern,
    pub model: ModelTier,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub performance: AgentPerformance,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl AgentRecord {
    /// Create an idle agent of the given type.
    ///
    /// When `capabilities` is `None` the per-type default set is used.
    pub fn new(agent_type: AgentType, capabilities: Option<Vec<String>>) -> Self {
        let id = AgentId::new(agent_type);
        let capabilities = match capabilities {
            Some(caps) if !caps.is_empty() => caps.into_iter().collect(),
            _ => super::default_capabilities(agent_type),
        };
        let now = Utc::now();

        Self {
            name: format!("{}-agent", agent_type),
            id,
            agent_type,
            cognitive_pattern: agent_type.cognitive_pattern(),
            model: agent_type.model_tier(),
            capabilities,
            status: AgentStatus::Idle,
            performance: AgentPerformance::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.agent_type == AgentType::Coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id() {
        let id1 = AgentId::new(AgentType::Coder);
        let id2 = AgentId::new(AgentType::Coder);
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("coder-"));
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("Coder".parse::<AgentType>().unwrap(), AgentType::Coder);
        assert_eq!(" queen ".parse::<AgentType>().unwrap(), AgentType::Coordinator);
        assert!("wizard".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_performance_ema() {
        let mut perf = AgentPerformance::default();
        perf.record(false, 1000, 0.1);
        assert_eq!(perf.tasks_completed, 1);
        assert!((perf.success_rate - 0.72).abs() < 1e-9);
        assert!((perf.average_response_time_ms - 2800.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_defaults() {
        let agent = AgentRecord::new(AgentType::Tester, None);
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.cognitive_pattern, CognitivePattern::Critical);
        assert!(agent.capabilities.contains("test-generation"));

        let custom = AgentRecord::new(AgentType::Tester, Some(vec!["fuzzing".to_string()]));
        assert_eq!(custom.capabilities.len(), 1);
    }
}
