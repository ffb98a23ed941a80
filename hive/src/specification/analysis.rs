//! Specification complexity analysis

use serde::{Deserialize, Serialize};

use super::Specification;
use crate::coordination::Topology;

/// How a plan's tasks are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One task at a time in dependency order
    Sequential,

    /// Dependency waves, each wave run concurrently
    ParallelWithDependencies,

    /// Every task at once
    Parallel,
}

impl From<Topology> for ExecutionStrategy {
    fn from(topology: Topology) -> Self {
        match topology {
            Topology::Hierarchical => Self::Sequential,
            Topology::Mesh => Self::ParallelWithDependencies,
            Topology::Star => Self::Parallel,
        }
    }
}

/// Analysis of a specification prior to planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationAnalysis {
    /// Normalized complexity (0.0 - 1.0)
    pub complexity: f64,
    pub topology: Topology,
    pub strategy: ExecutionStrategy,
    pub requirement_count: usize,
    pub task_count: usize,
    pub dependency_count: usize,
}

impl SpecificationAnalysis {
    pub fn analyze(spec: &Specification) -> Self {
        let requirement_count = spec.requirements.len();
        let task_count = spec.tasks.len();
        let dependency_count = spec.dependency_count();

        let complexity = complexity_score(requirement_count, task_count, dependency_count);
        let topology = recommend_topology(complexity);

        Self {
            complexity,
            topology,
            strategy: topology.into(),
            requirement_count,
            task_count,
            dependency_count,
        }
    }
}

/// Weighted size of a specification, normalized to [0, 1]
pub fn complexity_score(requirements: usize, tasks: usize, dependencies: usize) -> f64 {
    let raw = 0.3 * requirements as f64 + 0.5 * tasks as f64 + 0.2 * dependencies as f64;
    (raw / 10.0).clamp(0.0, 1.0)
}

pub fn recommend_topology(complexity: f64) -> Topology {
    if complexity > 0.7 {
        Topology::Hierarchical
    } else if complexity > 0.4 {
        Topology::Mesh
    } else {
        Topology::Star
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::{TaskDefinition, TaskType};

    #[test]
    fn test_complexity_bounds() {
        assert_eq!(complexity_score(0, 0, 0), 0.0);
        assert_eq!(complexity_score(100, 100, 100), 1.0);
        assert!((complexity_score(2, 3, 2) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_topology_thresholds() {
        assert_eq!(recommend_topology(0.71), Topology::Hierarchical);
        assert_eq!(recommend_topology(0.7), Topology::Mesh);
        assert_eq!(recommend_topology(0.41), Topology::Mesh);
        assert_eq!(recommend_topology(0.4), Topology::Star);
    }

    #[test]
    fn test_small_specification_runs_parallel() {
        let spec = Specification::new("s", "small")
            .with_task(TaskDefinition::new("a", TaskType::Design, "a"))
            .with_task(TaskDefinition::new("b", TaskType::Testing, "b").depends_on("a"));

        let analysis = SpecificationAnalysis::analyze(&spec);
        assert_eq!(analysis.task_count, 2);
        assert_eq!(analysis.dependency_count, 1);
        assert_eq!(analysis.topology, Topology::Star);
        assert_eq!(analysis.strategy, ExecutionStrategy::Parallel);
    }
}
