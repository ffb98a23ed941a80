//! Hive - Specification-Driven Agent Orchestration
//!
//! Hive coordinates a pool of specialized agents that execute the tasks of a
//! structured project specification. Work is assigned by a scoring load
//! balancer and every state transition is recorded in a durable memory store.
//!
//! # Architecture
//!
//! - `agents` - Agent records, per-type defaults and the active/dormant lifecycle
//! - `specification` - Specification model, text parser, complexity analysis and results
//! - `balancer` - Assignment scoring, capacity tracking and load rebalancing
//! - `memory` - File-backed memory store with query, health check and retention
//! - `orchestration` - Orchestrator, execution strategies and pluggable task executors
//! - `coordination` - Coordination topologies and the typed event channel
//! - `monitoring` - Performance counters and health classification
//! - `config` - TOML configuration with environment overrides
//! - `commands` - CLI command implementations

pub mod agents;
pub mod specification;
pub mod balancer;
pub mod memory;
pub mod orchestration;
pub mod coordination;
pub mod monitoring;
pub mod config;

// CLI commands
pub mod commands;

pub use agents::{AgentId, AgentRecord, AgentType};
pub use balancer::LoadBalancer;
pub use config::HiveConfig;
pub use coordination::HiveEvent;
pub use memory::MemoryStore;
pub use orchestration::{Orchestrator, OrchestrationError, SimulatedExecutor, TaskExecutor};
pub use specification::{parse_specification, Specification, SpecificationResult};

/// Hive version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
