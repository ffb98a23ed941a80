//! Network topology selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Shape of coordination between the coordinator and workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Coordinator drives workers one stage at a time
    Hierarchical,

    /// Workers proceed concurrently, gated by task dependencies
    Mesh,

    /// Coordinator fans work out to every worker at once
    Star,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Mesh => "mesh",
            Self::Star => "star",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hierarchical" => Ok(Self::Hierarchical),
            "mesh" => Ok(Self::Mesh),
            "star" => Ok(Self::Star),
            other => Err(format!("unknown topology: {}", other)),
        }
    }
}
