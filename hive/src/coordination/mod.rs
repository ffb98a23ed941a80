//! Coordination Topology and Events
//!
//! Typed event channel the host subscribes to, replacing ad hoc event
//! emitters, plus the coordination topologies the orchestrator can adopt.

pub mod topology;
pub mod message_bus;

pub use topology::*;
pub use message_bus::*;
