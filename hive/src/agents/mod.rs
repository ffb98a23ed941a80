//! Agent Types and Lifecycle
//!
//! This module provides the agent records managed by the hive: typed workers
//! carrying a capability set, a cognitive-pattern tag, and a performance record.
//!
//! # Agent Types
//!
//! - `Coordinator` - The orchestration root ("queen"); created at initialization, never terminated
//! - `Architect` - System design and architecture planning
//! - `Coder` - Code generation, modification, and refactoring
//! - `Tester` - Test generation and execution
//! - `Analyst` - Requirements and performance analysis
//! - `Researcher` - Information gathering
//! - `Reviewer` - Code review and quality assessment
//! - `Optimizer` - Performance and resource optimization

pub mod types;
pub mod capabilities;
pub mod lifecycle;

pub use types::*;
pub use capabilities::*;
pub use lifecycle::*;

/// Agent-specific errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Unknown agent type: {0}")]
    UnknownType(String),
}
