//! Assignment scoring
//!
//! Composite score = 0.3 × availability + 0.4 × capability match
//! + 0.3 × performance + 0.2 × specialization, scaled by the priority
//! multiplier and clamped to [0, 1].

use serde::{Deserialize, Serialize};

use super::{AgentLoad, TaskRequest};
use crate::agents::capability_match;

const AVAILABILITY_WEIGHT: f64 = 0.3;
const CAPABILITY_WEIGHT: f64 = 0.4;
const PERFORMANCE_WEIGHT: f64 = 0.3;
const SPECIALIZATION_WEIGHT: f64 = 0.2;

/// Individual factors behind an agent's score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub capability_match: f64,
    pub performance: f64,
    pub specialization: f64,
    /// Priority-scaled score before clamping; used to order candidates
    pub raw: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    /// Human-readable summary of the favorable factors
    pub fn reasoning(&self, load: &AgentLoad) -> String {
        let mut reasons = Vec::new();

        if self.availability > 0.7 {
            reasons.push(format!("high availability ({:.0}% free)", self.availability * 100.0));
        }
        if self.capability_match > 0.7 {
            reasons.push(format!("strong capability match ({:.0}%)", self.capability_match * 100.0));
        }
        if self.performance > 0.8 {
            reasons.push("excellent performance history".to_string());
        }
        if self.specialization > 0.7 {
            reasons.push(format!("specialized {} agent", load.agent_type));
        }

        if reasons.is_empty() {
            format!("best available {} agent (score {:.2})", load.agent_type, self.total)
        } else {
            format!("{} (score {:.2})", reasons.join(", "), self.total)
        }
    }
}

/// Blend of success rate, response time, efficiency, accuracy and reliability
pub fn performance_score(load: &AgentLoad) -> f64 {
    let perf = &load.performance;
    let response_score = (1.0 - perf.average_response_time_ms / 10_000.0).max(0.0);

    0.3 * perf.success_rate
        + 0.2 * response_score
        + 0.15 * perf.token_efficiency
        + 0.15 * perf.accuracy
        + 0.2 * perf.reliability
}

pub fn score_agent(load: &AgentLoad, request: &TaskRequest) -> ScoreBreakdown {
    let availability = (1.0 - load.utilization_rate).clamp(0.0, 1.0);
    let capability_match = capability_match(&load.capabilities, request.task_type);
    let performance = performance_score(load);
    let specialization = load.performance.specialization_for(request.task_type);

    let weighted = AVAILABILITY_WEIGHT * availability
        + CAPABILITY_WEIGHT * capability_match
        + PERFORMANCE_WEIGHT * performance
        + SPECIALIZATION_WEIGHT * specialization;

    let raw = weighted * request.priority.multiplier();

    ScoreBreakdown {
        availability,
        capability_match,
        performance,
        specialization,
        raw,
        total: raw.clamp(0.0, 1.0),
    }
}
