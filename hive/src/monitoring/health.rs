//! Hive health classification

use super::*;

/// Overall hive health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Offline,
}

impl HealthStatus {
    /// Classify by issue count: none is healthy, one or two degraded, more critical
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => Self::Healthy,
            1..=2 => Self::Degraded,
            _ => Self::Critical,
        }
    }
}

/// Result of the most recent health assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl HealthReport {
    pub fn offline() -> Self {
        Self {
            status: HealthStatus::Offline,
            issues: Vec::new(),
            last_health_check: None,
        }
    }

    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            status: HealthStatus::from_issue_count(issues.len()),
            issues,
            last_health_check: Some(Utc::now()),
        }
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::offline()
    }
}
