//! Agent Lifecycle Management
//!
//! An agent is either active (schedulable, tracked by the load balancer) or
//! dormant (parked with a context snapshot so it can be reactivated later).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentRecord, AgentStatus};
use crate::memory::AgentContext;

/// Context captured when an agent is parked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DormantSnapshot {
    pub agent: AgentRecord,
    pub context: AgentContext,
    pub dormant_since: DateTime<Utc>,
}

/// Registry slot for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AgentSlot {
    Active(AgentRecord),
    Dormant(DormantSnapshot),
}

impl AgentSlot {
    pub fn record(&self) -> &AgentRecord {
        match self {
            Self::Active(agent) => agent,
            Self::Dormant(snapshot) => &snapshot.agent,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Mutable access to the record of an active agent
    pub fn active_mut(&mut self) -> Option<&mut AgentRecord> {
        match self {
            Self::Active(agent) => Some(agent),
            Self::Dormant(_) => None,
        }
    }

    /// Park an active agent. Returns `None` when the slot is already dormant.
    pub fn into_dormant(self, context: AgentContext) -> Option<DormantSnapshot> {
        match self {
            Self::Active(mut agent) => {
                agent.status = AgentStatus::Offline;
                Some(DormantSnapshot {
                    agent,
                    context,
                    dormant_since: Utc::now(),
                })
            }
            Self::Dormant(_) => None,
        }
    }
}

impl DormantSnapshot {
    /// Bring the parked agent back as an idle, active record
    pub fn reactivate(self) -> (AgentRecord, AgentContext) {
        let mut agent = self.agent;
        agent.status = AgentStatus::Idle;
        agent.last_active = Utc::now();
        (agent, self.context)
    }
}
