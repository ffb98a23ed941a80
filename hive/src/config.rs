//! Hive configuration.
//!
//! Configuration is a TOML document with one table per subsystem. Every field
//! has a default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [orchestrator]
//! mode = "adaptive"
//! max_agents = 12
//!
//! [load_balancer]
//! rebalance_threshold = 0.3
//!
//! [memory]
//! path = "/var/lib/hive/memory.json"
//! retention_days = 30
//! ```
//!
//! Environment overrides (`HIVE_MAX_AGENTS`, `HIVE_MEMORY_PATH`, `HIVE_MODE`)
//! are applied on top of the file by [`HiveConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::AgentType;
use crate::coordination::Topology;
use crate::specification::ExecutionStrategy;

/// Environment variable naming the configuration file
pub const ENV_CONFIG_PATH: &str = "HIVE_CONFIG_PATH";
pub const ENV_MAX_AGENTS: &str = "HIVE_MAX_AGENTS";
pub const ENV_MEMORY_PATH: &str = "HIVE_MEMORY_PATH";
pub const ENV_MODE: &str = "HIVE_MODE";
pub const ENV_LOG_LEVEL: &str = "HIVE_LOG_LEVEL";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub orchestrator: OrchestratorConfig,
    pub load_balancer: LoadBalancerConfig,
    pub memory: MemoryConfig,
    pub executor: ExecutorConfig,
}

/// How the orchestrator picks an execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    /// Derive the strategy from specification complexity
    #[default]
    Adaptive,
    Sequential,
    Parallel,
    ParallelWithDependencies,
}

impl OrchestrationMode {
    /// Fixed strategy for non-adaptive modes
    pub fn fixed_strategy(&self) -> Option<ExecutionStrategy> {
        match self {
            Self::Adaptive => None,
            Self::Sequential => Some(ExecutionStrategy::Sequential),
            Self::Parallel => Some(ExecutionStrategy::Parallel),
            Self::ParallelWithDependencies => Some(ExecutionStrategy::ParallelWithDependencies),
        }
    }
}

impl FromStr for OrchestrationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "adaptive" | "auto" => Ok(Self::Adaptive),
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "parallel_with_dependencies" | "waves" => Ok(Self::ParallelWithDependencies),
            other => Err(ConfigError::Invalid(format!(
                "Invalid orchestration mode '{}'. Must be one of: adaptive, sequential, parallel, parallel_with_dependencies",
                other
            ))),
        }
    }
}

/// Number of agents of one type in the bootstrap pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAgent {
    pub agent_type: AgentType,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub mode: OrchestrationMode,

    /// Fixed coordination topology; derived from complexity when absent
    pub topology: Option<Topology>,

    /// Maximum number of active agents, coordinator included
    pub max_agents: usize,

    pub seed_pool: Vec<SeedAgent>,

    pub health_check_interval_secs: u64,

    /// Upper bound on a single executor call
    pub task_timeout_secs: u64,

    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: OrchestrationMode::Adaptive,
            topology: None,
            max_agents: 12,
            seed_pool: vec![
                SeedAgent { agent_type: AgentType::Architect, count: 1 },
                SeedAgent { agent_type: AgentType::Coder, count: 2 },
                SeedAgent { agent_type: AgentType::Tester, count: 1 },
                SeedAgent { agent_type: AgentType::Analyst, count: 1 },
            ],
            health_check_interval_secs: 30,
            task_timeout_secs: 300,
            event_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn seed_size(&self) -> usize {
        self.seed_pool.iter().map(|s| s.count).sum()
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Utilization standard deviation that triggers redistribution
    pub rebalance_threshold: f64,
    pub rebalance_interval_secs: u64,
    pub overload_threshold: f64,
    pub underload_threshold: f64,
    /// Smoothing factor for moving averages
    pub ema_alpha: f64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            rebalance_threshold: 0.3,
            rebalance_interval_secs: 30,
            overload_threshold: 0.8,
            underload_threshold: 0.5,
            ema_alpha: 0.1,
        }
    }
}

impl LoadBalancerConfig {
    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Backing file; `None` keeps the store in process memory only
    pub path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub retention_days: i64,
    pub cleanup_interval_secs: u64,
    pub recent_interactions: usize,
    pub recent_tasks: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_size_bytes: 50 * 1024 * 1024, // 50MB
            retention_days: 30,
            cleanup_interval_secs: 3600,
            recent_interactions: 10,
            recent_tasks: 5,
        }
    }
}

impl MemoryConfig {
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Settings for the simulated executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub success_rate: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 500,
            success_rate: 0.9,
        }
    }
}

impl HiveConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: HiveConfig = toml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from `HIVE_CONFIG_PATH` when set, otherwise defaults; env overrides applied
    pub fn from_env_or_default() -> Result<Self> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_MAX_AGENTS) {
            match value.parse() {
                Ok(max) => self.orchestrator.max_agents = max,
                Err(_) => warn!("Ignoring invalid {}={}", ENV_MAX_AGENTS, value),
            }
        }

        if let Ok(path) = std::env::var(ENV_MEMORY_PATH) {
            self.memory.path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var(ENV_MODE) {
            match value.parse() {
                Ok(mode) => self.orchestrator.mode = mode,
                Err(e) => warn!("Ignoring {}: {}", ENV_MODE, e),
            }
        }
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<()> {
        let orchestrator = &self.orchestrator;
        let required = orchestrator.seed_size() + 1;
        if orchestrator.max_agents < required {
            return Err(ConfigError::Invalid(format!(
                "max_agents ({}) must hold the coordinator and the seed pool ({})",
                orchestrator.max_agents, required
            )));
        }

        if orchestrator
            .seed_pool
            .iter()
            .any(|seed| seed.agent_type == AgentType::Coordinator)
        {
            return Err(ConfigError::Invalid(
                "seed_pool must not contain coordinator agents".to_string(),
            ));
        }

        if orchestrator.health_check_interval_secs == 0 || orchestrator.task_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "health_check_interval_secs and task_timeout_secs must be positive".to_string(),
            ));
        }

        let balancer = &self.load_balancer;
        for (name, value) in [
            ("rebalance_threshold", balancer.rebalance_threshold),
            ("overload_threshold", balancer.overload_threshold),
            ("underload_threshold", balancer.underload_threshold),
            ("ema_alpha", balancer.ema_alpha),
            ("success_rate", self.executor.success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if balancer.rebalance_interval_secs == 0 || self.memory.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rebalance_interval_secs and cleanup_interval_secs must be positive".to_string(),
            ));
        }

        if self.memory.retention_days <= 0 {
            return Err(ConfigError::Invalid("retention_days must be positive".to_string()));
        }

        if self.executor.min_delay_ms > self.executor.max_delay_ms {
            return Err(ConfigError::Invalid(
                "executor min_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }
}
