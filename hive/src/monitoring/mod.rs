//! Performance Monitoring and Health
//!
//! Counters behind the hive performance report and the health classification
//! produced by the periodic health check.

use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

pub mod metrics;
pub mod health;

pub use metrics::*;
pub use health::*;
