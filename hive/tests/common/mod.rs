//! Common test utilities for Hive tests
//!
//! Scripted executors, configuration builders and specification fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hive::agents::{AgentRecord, AgentType};
use hive::config::{HiveConfig, MemoryConfig, OrchestrationMode};
use hive::orchestration::{ExecutorError, Orchestrator, TaskExecutor, TaskOutput};
use hive::specification::{Specification, TaskDefinition, TaskType};

/// Executor with per-task scripted outcomes that records execution order
pub struct ScriptedExecutor {
    failing: HashSet<String>,
    unavailable: HashSet<String>,
    delays: HashMap<String, Duration>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            unavailable: HashSet::new(),
            delays: HashMap::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, task_id: &str) -> Self {
        self.failing.insert(task_id.to_string());
        self
    }

    pub fn unavailable(mut self, task_id: &str) -> Self {
        self.unavailable.insert(task_id.to_string());
        self
    }

    pub fn delayed(mut self, task_id: &str, delay: Duration) -> Self {
        self.delays.insert(task_id.to_string(), delay);
        self
    }

    /// Task ids in the order execution started
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &TaskDefinition, agent: &AgentRecord) -> Result<TaskOutput, ExecutorError> {
        self.executed.lock().unwrap().push(task.id.clone());

        if let Some(delay) = self.delays.get(&task.id) {
            tokio::time::sleep(*delay).await;
        }

        if self.unavailable.contains(&task.id) {
            return Err(ExecutorError::AgentUnavailable(format!("{} crashed", agent.id)));
        }
        if self.failing.contains(&task.id) {
            return Err(ExecutorError::TaskFailed(format!("{} rejected", task.id)));
        }

        Ok(TaskOutput::new(format!("{} done by {}", task.id, agent.id), 100))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Ephemeral configuration with the given mode
pub fn test_config(mode: OrchestrationMode) -> HiveConfig {
    let mut config = HiveConfig::default();
    config.orchestrator.mode = mode;
    config.memory = MemoryConfig::ephemeral();
    config
}

/// File-backed configuration rooted in `dir`
pub fn file_config(dir: &Path, mode: OrchestrationMode) -> HiveConfig {
    let mut config = test_config(mode);
    config.memory = MemoryConfig::at(dir.join("memory.json"));
    config
}

pub async fn start_hive(executor: Arc<ScriptedExecutor>, config: HiveConfig) -> Arc<Orchestrator> {
    let hive = Orchestrator::new(executor);
    hive.initialize(config).await.expect("hive initializes");
    hive
}

/// design -> implementation -> testing, with explicit agent types
pub fn chain_spec(id: &str, types: [AgentType; 3]) -> Specification {
    Specification::new(id, format!("Chain {}", id))
        .with_task(TaskDefinition::new("task-001", TaskType::Design, "Design it").with_agent(types[0]))
        .with_task(
            TaskDefinition::new("task-002", TaskType::Implementation, "Build it")
                .with_agent(types[1])
                .depends_on("task-001"),
        )
        .with_task(
            TaskDefinition::new("task-003", TaskType::Testing, "Test it")
                .with_agent(types[2])
                .depends_on("task-002"),
        )
}

pub fn default_chain(id: &str) -> Specification {
    chain_spec(id, [AgentType::Architect, AgentType::Coder, AgentType::Tester])
}
