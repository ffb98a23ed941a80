//! Agent Capabilities
//!
//! Defines the default capability sets per agent type, the capabilities each
//! task type requires, and the type-to-task affinity table used to seed an
//! agent's specialization map.

use std::collections::{BTreeSet, HashMap};

use super::AgentType;
use crate::specification::TaskType;

/// Affinity assumed for agent/task pairs missing from the table
pub const DEFAULT_AFFINITY: f64 = 0.5;

/// Default capability set for an agent type
pub fn default_capabilities(agent_type: AgentType) -> BTreeSet<String> {
    let caps: &[&str] = match agent_type {
        AgentType::Coordinator => &[
            "task-decomposition",
            "workflow-management",
            "agent-coordination",
            "resource-allocation",
        ],
        AgentType::Architect => &[
            "system-design",
            "api-design",
            "architecture-analysis",
            "database-design",
        ],
        AgentType::Coder => &[
            "code-generation",
            "refactoring",
            "debugging",
            "code-analysis",
        ],
        AgentType::Tester => &[
            "test-generation",
            "test-execution",
            "coverage-analysis",
            "debugging",
        ],
        AgentType::Analyst => &[
            "requirements-analysis",
            "performance-analysis",
            "code-analysis",
            "data-analysis",
        ],
        AgentType::Researcher => &[
            "information-retrieval",
            "technology-research",
            "requirements-analysis",
            "documentation",
        ],
        AgentType::Reviewer => &[
            "code-review",
            "quality-assessment",
            "security-analysis",
            "code-analysis",
        ],
        AgentType::Optimizer => &[
            "performance-optimization",
            "code-optimization",
            "resource-optimization",
            "performance-analysis",
        ],
    };

    caps.iter().map(|c| c.to_string()).collect()
}

/// Capabilities a task of the given type needs
pub fn required_capabilities(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::Design => &["system-design", "architecture-analysis", "api-design"],
        TaskType::Implementation => &["code-generation", "refactoring", "debugging"],
        TaskType::Testing => &["test-generation", "test-execution", "coverage-analysis"],
        TaskType::Review => &["code-review", "quality-assessment", "security-analysis"],
        TaskType::Optimization => &[
            "performance-optimization",
            "code-optimization",
            "performance-analysis",
        ],
    }
}

/// Fraction of the task's required capabilities the agent holds
pub fn capability_match(capabilities: &BTreeSet<String>, task_type: TaskType) -> f64 {
    let required = required_capabilities(task_type);
    if required.is_empty() {
        return 0.0;
    }

    let matched = required.iter().filter(|cap| capabilities.contains(**cap)).count();
    matched as f64 / required.len() as f64
}

/// Seed specialization map for a freshly registered agent
pub fn affinity_table(agent_type: AgentType) -> HashMap<TaskType, f64> {
    let known: &[(TaskType, f64)] = match agent_type {
        AgentType::Coordinator => &[(TaskType::Design, 0.6), (TaskType::Review, 0.6)],
        AgentType::Architect => &[(TaskType::Design, 0.9), (TaskType::Review, 0.6)],
        AgentType::Coder => &[
            (TaskType::Implementation, 0.9),
            (TaskType::Optimization, 0.6),
            (TaskType::Testing, 0.4),
        ],
        AgentType::Tester => &[(TaskType::Testing, 0.9), (TaskType::Review, 0.6)],
        AgentType::Analyst => &[
            (TaskType::Review, 0.7),
            (TaskType::Optimization, 0.7),
            (TaskType::Design, 0.5),
        ],
        AgentType::Researcher => &[(TaskType::Design, 0.6), (TaskType::Review, 0.5)],
        AgentType::Reviewer => &[(TaskType::Review, 0.9), (TaskType::Testing, 0.6)],
        AgentType::Optimizer => &[
            (TaskType::Optimization, 0.9),
            (TaskType::Implementation, 0.6),
        ],
    };

    TaskType::ALL
        .iter()
        .map(|task_type| {
            let affinity = known
                .iter()
                .find(|(t, _)| t == task_type)
                .map(|(_, a)| *a)
                .unwrap_or(DEFAULT_AFFINITY);
            (*task_type, affinity)
        })
        .collect()
}
