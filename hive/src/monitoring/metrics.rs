//! Metrics collection and aggregation

use std::time::Instant;

use super::*;

pub struct MetricsCollector {
    total_tasks: AtomicU64,
    successful_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    total_duration_ms: AtomicU64,
    total_tokens: AtomicU64,
    started_at: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_tasks: AtomicU64::new(0),
            successful_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_task_completion(&self, duration_ms: u64, tokens: u64, success: bool) {
        self.total_tasks.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.total_tokens.fetch_add(tokens, Ordering::Relaxed);

        if success {
            self.successful_tasks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_tasks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            successful_tasks: self.successful_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            avg_duration_ms: self.calculate_average_duration(),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            tasks_per_second: self.calculate_throughput(),
            success_rate: self.calculate_success_rate(),
            timestamp: Utc::now(),
        }
    }

    fn calculate_average_duration(&self) -> f64 {
        let total = self.total_tasks.load(Ordering::Relaxed);
        if total > 0 {
            self.total_duration_ms.load(Ordering::Relaxed) as f64 / total as f64
        } else {
            0.0
        }
    }

    fn calculate_throughput(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_tasks.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Success rate (0.0 - 1.0); 1.0 before any task has run
    fn calculate_success_rate(&self) -> f64 {
        let total = self.total_tasks.load(Ordering::Relaxed);
        if total > 0 {
            self.successful_tasks.load(Ordering::Relaxed) as f64 / total as f64
        } else {
            1.0
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub avg_duration_ms: f64,
    pub total_tokens: u64,
    pub tasks_per_second: f64,
    pub success_rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = MetricsCollector::new();
        assert_eq!(metrics.snapshot().success_rate, 1.0);

        metrics.record_task_completion(100, 50, true);
        metrics.record_task_completion(300, 150, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_tasks, 2);
        assert_eq!(snapshot.failed_tasks, 1);
        assert_eq!(snapshot.total_tokens, 200);
        assert_eq!(snapshot.avg_duration_ms, 200.0);
        assert_eq!(snapshot.success_rate, 0.5);
    }
}
