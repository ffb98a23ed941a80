//! Project Specifications
//!
//! A specification is a decomposed project description: ordered requirements,
//! architecture notes, and typed, dependency-linked task definitions that the
//! orchestrator turns into agent assignments.
//!
//! # Modules
//!
//! - `parser` - Tolerant parser for the sectioned specification text format
//! - `analysis` - Complexity scoring and coordination topology recommendation
//! - `results` - Per-task and per-specification execution results

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentType;

pub mod parser;
pub mod analysis;
pub mod results;

pub use parser::*;
pub use analysis::*;
pub use results::*;

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Design,
    Implementation,
    Testing,
    Review,
    Optimization,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Design,
        TaskType::Implementation,
        TaskType::Testing,
        TaskType::Review,
        TaskType::Optimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Review => "review",
            Self::Optimization => "optimization",
        }
    }

    /// Agent type that handles this task when the specification names none
    pub fn default_agent_type(&self) -> AgentType {
        match self {
            Self::Design => AgentType::Architect,
            Self::Implementation => AgentType::Coder,
            Self::Testing => AgentType::Tester,
            Self::Review => AgentType::Reviewer,
            Self::Optimization => AgentType::Optimizer,
        }
    }

    /// Lenient conversion used by the parser; unknown text maps to `Implementation`
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Implementation)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "design" | "architecture" => Ok(Self::Design),
            "implementation" | "development" | "coding" => Ok(Self::Implementation),
            "testing" | "test" => Ok(Self::Testing),
            "review" => Ok(Self::Review),
            "optimization" | "optimisation" => Ok(Self::Optimization),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

/// Specification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Scaling applied to assignment scores
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Critical => 1.5,
            Self::High => 1.2,
            Self::Medium => 1.0,
            Self::Low => 0.8,
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// One unit of work inside a specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub task_type: TaskType,
    pub description: String,
    pub assigned_agent_type: AgentType,
    pub dependencies: Vec<String>,
    pub estimated_duration_hours: u32,
    pub acceptance_criteria: String,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type,
            description: description.into(),
            assigned_agent_type: task_type.default_agent_type(),
            dependencies: Vec::new(),
            estimated_duration_hours: 1,
            acceptance_criteria: String::new(),
        }
    }

    pub fn with_agent(mut self, agent_type: AgentType) -> Self {
        self.assigned_agent_type = agent_type;
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }
}

/// A decomposed project description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub id: String,
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub architecture: Vec<String>,
    pub tasks: Vec<TaskDefinition>,
    pub acceptance_criteria: Vec<String>,
    pub priority: Priority,
    pub estimated_duration_hours: u32,
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Specification {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            requirements: Vec::new(),
            architecture: Vec::new(),
            tasks: Vec::new(),
            acceptance_criteria: Vec::new(),
            priority: Priority::Medium,
            estimated_duration_hours: 0,
            dependencies: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.estimated_duration_hours += task.estimated_duration_hours;
        self.tasks.push(task);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Number of dependency edges: task-to-task links plus external dependencies
    pub fn dependency_count(&self) -> usize {
        self.tasks.iter().map(|t| t.dependencies.len()).sum::<usize>() + self.dependencies.len()
    }
}
