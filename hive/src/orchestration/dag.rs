//! Task dependency graph
//!
//! Validates the task DAG of a specification and produces stable execution
//! orders: ties between ready tasks always resolve to the original task order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tracing::warn;

use super::{OrchestrationError, Result};
use crate::specification::TaskDefinition;

pub struct TaskGraph {
    ids: Vec<String>,
    /// Indices of each task's in-specification dependencies
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build the graph, rejecting duplicate ids and cycles.
    ///
    /// Dependencies naming tasks outside the specification are ignored.
    pub fn build(tasks: &[TaskDefinition]) -> Result<Self> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(OrchestrationError::InvalidRequest(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }

        let mut dependencies = vec![Vec::new(); tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                match index.get(dep.as_str()) {
                    Some(&j) => {
                        if !dependencies[i].contains(&j) {
                            dependencies[i].push(j);
                            dependents[j].push(i);
                        }
                    }
                    None => warn!(task_id = %task.id, dependency = %dep, "Ignoring unknown task dependency"),
                }
            }
        }

        let graph = Self {
            ids: tasks.iter().map(|t| t.id.clone()).collect(),
            dependencies,
            dependents,
        };

        let order = graph.kahn();
        if order.len() < graph.len() {
            let task_id = (0..graph.len())
                .find(|i| !order.contains(i))
                .map(|i| graph.ids[i].clone())
                .unwrap_or_default();
            return Err(OrchestrationError::CycleDetected { task_id });
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// Dependency-respecting order, preferring the lowest original index
    pub fn topological_order(&self) -> Vec<usize> {
        self.kahn()
    }

    /// Tasks grouped by dependency depth; every task's dependencies sit in earlier waves
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; self.len()];
        for i in self.kahn() {
            depth[i] = self.dependencies[i]
                .iter()
                .map(|&d| depth[d] + 1)
                .max()
                .unwrap_or(0);
        }

        let levels = depth.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut waves = vec![Vec::new(); levels];
        for (i, d) in depth.into_iter().enumerate() {
            waves[d].push(i);
        }
        waves
    }

    fn kahn(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &self.dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        order
    }
}
