//! Load Balancer
//!
//! Maintains per-agent load, capacity and performance state, ranks candidate
//! agents for incoming tasks, and periodically redistributes load away from
//! overloaded agents.
//!
//! # Features
//!
//! - Composite scoring (availability, capability match, performance, specialization)
//! - Capacity enforcement with per-agent single-writer updates
//! - Exponential moving averages of success rate and response time
//! - Variance-triggered synthetic rebalancing on a background timer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant as TokioInstant};
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentRecord};
use crate::config::LoadBalancerConfig;
use crate::specification::TaskType;

pub mod types;
pub mod scoring;

pub use types::*;
pub use scoring::*;

/// Result type for load balancer operations
pub type Result<T> = std::result::Result<T, BalancerError>;

/// Load balancer errors
#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    #[error("No suitable agent with spare capacity for task {task_id}")]
    NoSuitableAgent { task_id: String },

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),
}

/// Bookkeeping for an assigned task
#[derive(Debug, Clone)]
struct ActiveAssignment {
    agent_id: AgentId,
    task_type: TaskType,
    assigned_at: Instant,
    started: bool,
}

#[derive(Default)]
struct BalancerStats {
    total_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    total_wait_ms: AtomicU64,
    waits_recorded: AtomicU64,
}

pub struct LoadBalancer {
    config: LoadBalancerConfig,

    /// Load table indexed by agent ID
    loads: DashMap<AgentId, AgentLoad>,

    /// Assigned, not yet completed tasks
    assignments: DashMap<String, ActiveAssignment>,

    stats: BalancerStats,
    started_at: Instant,
    rebalance_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancer {
    pub fn new(config: LoadBalancerConfig) -> Self {
        Self {
            config,
            loads: DashMap::new(),
            assignments: DashMap::new(),
            stats: BalancerStats::default(),
            started_at: Instant::now(),
            rebalance_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    // ========================================================================
    // Agent Registration
    // ========================================================================

    /// Rebuild the load table from scratch
    pub fn initialize_agents(&self, agents: &[AgentRecord]) {
        self.loads.clear();
        self.assignments.clear();

        for agent in agents {
            self.register_agent(agent);
        }

        info!("Load balancer initialized with {} agents", agents.len());
    }

    pub fn register_agent(&self, agent: &AgentRecord) {
        let load = AgentLoad::from_agent(agent);
        debug!(
            agent_id = %agent.id,
            max_capacity = load.max_capacity,
            "Registering agent with load balancer"
        );
        self.loads.insert(agent.id.clone(), load);
    }

    pub fn remove_agent(&self, agent_id: &AgentId) -> Option<AgentLoad> {
        self.assignments.retain(|_, a| &a.agent_id != agent_id);
        self.loads.remove(agent_id).map(|(_, load)| load)
    }

    /// Include or exclude an agent from ranking
    pub fn set_availability(&self, agent_id: &AgentId, available: bool) -> Result<()> {
        let mut load = self
            .loads
            .get_mut(agent_id)
            .ok_or_else(|| BalancerError::AgentNotFound(agent_id.clone()))?;
        load.available = available;
        Ok(())
    }

    pub fn agent_load(&self, agent_id: &AgentId) -> Option<AgentLoad> {
        self.loads.get(agent_id).map(|l| l.clone())
    }

    pub fn loads(&self) -> Vec<AgentLoad> {
        self.loads.iter().map(|l| l.value().clone()).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.loads.len()
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Assign a task to the best-ranked agent with spare capacity
    pub fn assign_task(&self, request: &TaskRequest) -> Result<TaskAssignment> {
        for (agent_id, breakdown) in self.rank_candidates(request) {
            // Re-check under the entry lock; a concurrent assignment may have filled the agent
            let Some(mut load) = self.loads.get_mut(&agent_id) else {
                continue;
            };
            if !load.available || !load.has_capacity() {
                continue;
            }

            let assignment = Self::apply_assignment(&mut load, request, &breakdown);
            drop(load);

            self.track_assignment(request, &agent_id);
            debug!(
                task_id = %request.task_id,
                agent_id = %agent_id,
                confidence = assignment.confidence,
                "Task assigned"
            );
            return Ok(assignment);
        }

        Err(BalancerError::NoSuitableAgent {
            task_id: request.task_id.clone(),
        })
    }

    /// Place a task ignoring capacity, on the least-utilized agent of the
    /// requested type (or any available agent when none of that type exists)
    pub fn assign_overflow(&self, request: &TaskRequest) -> Result<TaskAssignment> {
        let candidates: Vec<AgentLoad> = self
            .loads
            .iter()
            .filter(|l| l.available)
            .map(|l| l.value().clone())
            .collect();

        let typed: Vec<&AgentLoad> = candidates
            .iter()
            .filter(|l| request.agent_type.is_none_or(|t| l.agent_type == t))
            .collect();
        let pool: Vec<&AgentLoad> = if typed.is_empty() {
            candidates.iter().collect()
        } else {
            typed
        };

        let target = pool
            .into_iter()
            .min_by(|a, b| {
                a.utilization_rate
                    .total_cmp(&b.utilization_rate)
                    .then_with(|| a.agent_id.cmp(&b.agent_id))
            })
            .map(|l| l.agent_id.clone())
            .ok_or_else(|| BalancerError::NoSuitableAgent {
                task_id: request.task_id.clone(),
            })?;

        let mut load = self
            .loads
            .get_mut(&target)
            .ok_or_else(|| BalancerError::AgentNotFound(target.clone()))?;
        let breakdown = score_agent(&load, request);
        let mut assignment = Self::apply_assignment(&mut load, request, &breakdown);
        let (current, capacity) = (load.current_load, load.max_capacity);
        drop(load);

        assignment.reasoning = format!("overflow placement: {}", assignment.reasoning);
        self.track_assignment(request, &target);
        warn!(
            task_id = %request.task_id,
            agent_id = %target,
            current_load = current,
            max_capacity = capacity,
            "Emergency overload assignment"
        );

        Ok(assignment)
    }

    /// Top three candidates for a task, without reserving capacity
    pub fn predict_optimal_assignment(&self, request: &TaskRequest) -> Vec<TaskAssignment> {
        self.rank_candidates(request)
            .into_iter()
            .take(3)
            .filter_map(|(agent_id, breakdown)| {
                self.loads
                    .get(&agent_id)
                    .map(|load| Self::build_assignment(&load, request, &breakdown))
            })
            .collect()
    }

    fn rank_candidates(&self, request: &TaskRequest) -> Vec<(AgentId, ScoreBreakdown)> {
        let mut ranked: Vec<(AgentId, ScoreBreakdown, f64)> = self
            .loads
            .iter()
            .filter(|l| l.available && l.has_capacity())
            .filter(|l| request.agent_type.is_none_or(|t| l.agent_type == t))
            .map(|l| (l.agent_id.clone(), score_agent(&l, request), l.utilization_rate))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.raw
                .total_cmp(&a.1.raw)
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        ranked.into_iter().map(|(id, breakdown, _)| (id, breakdown)).collect()
    }

    fn apply_assignment(
        load: &mut AgentLoad,
        request: &TaskRequest,
        breakdown: &ScoreBreakdown,
    ) -> TaskAssignment {
        let assignment = Self::build_assignment(load, request, breakdown);
        load.current_load += 1;
        load.queued_tasks += 1;
        load.last_assigned = Some(Utc::now());
        load.refresh_utilization();
        assignment
    }

    fn build_assignment(
        load: &AgentLoad,
        request: &TaskRequest,
        breakdown: &ScoreBreakdown,
    ) -> TaskAssignment {
        TaskAssignment {
            task_id: request.task_id.clone(),
            agent_id: load.agent_id.clone(),
            estimated_duration_ms: (load.average_task_duration_ms * (1.0 + load.utilization_rate))
                .round() as u64,
            confidence: breakdown.total,
            reasoning: breakdown.reasoning(load),
        }
    }

    fn track_assignment(&self, request: &TaskRequest, agent_id: &AgentId) {
        self.assignments.insert(
            request.task_id.clone(),
            ActiveAssignment {
                agent_id: agent_id.clone(),
                task_type: request.task_type,
                assigned_at: Instant::now(),
                started: false,
            },
        );
        self.stats.total_tasks.fetch_add(1, Ordering::Relaxed);
    }

    // ========================================================================
    // Task Progress
    // ========================================================================

    /// Record that an assigned task has begun executing
    pub fn mark_started(&self, task_id: &str) {
        let agent_id = match self.assignments.get_mut(task_id) {
            Some(mut assignment) if !assignment.started => {
                assignment.started = true;
                let wait_ms = assignment.assigned_at.elapsed().as_millis() as u64;
                self.stats.total_wait_ms.fetch_add(wait_ms, Ordering::Relaxed);
                self.stats.waits_recorded.fetch_add(1, Ordering::Relaxed);
                assignment.agent_id.clone()
            }
            _ => return,
        };

        if let Some(mut load) = self.loads.get_mut(&agent_id) {
            load.queued_tasks = load.queued_tasks.saturating_sub(1);
        }
    }

    /// Release a finished task and fold its outcome into the agent's averages
    pub fn complete_task(
        &self,
        task_id: &str,
        agent_id: &AgentId,
        success: bool,
        duration_ms: u64,
    ) -> Result<()> {
        let assignment = self.assignments.remove(task_id).map(|(_, a)| a);
        let alpha = self.config.ema_alpha;
        let outcome = if success { 1.0 } else { 0.0 };

        let mut load = self
            .loads
            .get_mut(agent_id)
            .ok_or_else(|| BalancerError::AgentNotFound(agent_id.clone()))?;

        load.current_load = load.current_load.saturating_sub(1);
        if assignment.as_ref().is_some_and(|a| !a.started) {
            load.queued_tasks = load.queued_tasks.saturating_sub(1);
        }

        let duration = duration_ms as f64;
        load.average_task_duration_ms = (1.0 - alpha) * load.average_task_duration_ms + alpha * duration;

        let perf = &mut load.performance;
        perf.success_rate = (1.0 - alpha) * perf.success_rate + alpha * outcome;
        perf.average_response_time_ms = (1.0 - alpha) * perf.average_response_time_ms + alpha * duration;
        perf.reliability = LoadPerformance::reliability_for(perf.success_rate, perf.average_response_time_ms);

        if let Some(assignment) = &assignment {
            let current = perf.specialization_for(assignment.task_type);
            perf.specialization
                .insert(assignment.task_type, (1.0 - alpha) * current + alpha * outcome);
        }

        load.refresh_utilization();
        drop(load);

        self.stats.completed_tasks.fetch_add(1, Ordering::Relaxed);
        debug!(task_id, agent_id = %agent_id, success, duration_ms, "Task completed");
        Ok(())
    }

    /// Release a task that will not run, leaving performance untouched
    pub fn cancel_task(&self, task_id: &str) {
        let Some((_, assignment)) = self.assignments.remove(task_id) else {
            return;
        };

        if let Some(mut load) = self.loads.get_mut(&assignment.agent_id) {
            load.current_load = load.current_load.saturating_sub(1);
            if !assignment.started {
                load.queued_tasks = load.queued_tasks.saturating_sub(1);
            }
            load.refresh_utilization();
        }
    }

    // ========================================================================
    // Rebalancing
    // ========================================================================

    /// Move synthetic load from overloaded to underloaded agents when
    /// utilization spread exceeds the configured threshold.
    ///
    /// Only counters move; in-flight work is not re-dispatched. A transfer is
    /// applied only if it does not increase the load variance. Transfer passes
    /// run until none is accepted, leaving a state a second call will not change.
    pub fn rebalance_load(&self) -> RebalanceReport {
        let mut snapshot: Vec<AgentLoad> = self.loads();
        snapshot.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let utilizations = |loads: &[AgentLoad]| -> Vec<f64> {
            loads
                .iter()
                .map(|l| utilization(l.current_load, l.max_capacity))
                .collect()
        };

        let variance_before = load_variance(&utilizations(&snapshot));
        if variance_before < self.config.rebalance_threshold {
            return RebalanceReport {
                triggered: false,
                variance_before,
                variance_after: variance_before,
                transfers: Vec::new(),
            };
        }

        let mut current_variance = variance_before;
        let mut transfers = Vec::new();

        // Passes repeat until one accepts nothing; each accepted transfer
        // strictly reduces the total excess over capacity.
        loop {
            let mut accepted = false;

            for source in self.overloaded_by_utilization(&snapshot) {
                let excess = snapshot[source].current_load.saturating_sub(snapshot[source].max_capacity);
                let units = excess.div_ceil(2);
                if units == 0 {
                    continue;
                }

                let Some(target) = self.pick_underloaded(&snapshot, source) else {
                    continue;
                };

                let headroom = snapshot[target].max_capacity.saturating_sub(snapshot[target].current_load);
                let moved = units.min(headroom);
                if moved == 0 {
                    continue;
                }

                let mut candidate = snapshot.clone();
                candidate[source].current_load -= moved;
                candidate[target].current_load += moved;
                let candidate_variance = load_variance(&utilizations(&candidate));
                if candidate_variance > current_variance {
                    continue;
                }

                snapshot = candidate;
                current_variance = candidate_variance;
                accepted = true;
                transfers.push(LoadTransfer {
                    from: snapshot[source].agent_id.clone(),
                    to: snapshot[target].agent_id.clone(),
                    units: moved,
                });
            }

            if !accepted {
                break;
            }
        }

        // Apply as deltas so concurrent assignments are not overwritten
        for transfer in &transfers {
            if let Some(mut load) = self.loads.get_mut(&transfer.from) {
                load.current_load = load.current_load.saturating_sub(transfer.units);
                load.refresh_utilization();
            }
            if let Some(mut load) = self.loads.get_mut(&transfer.to) {
                load.current_load += transfer.units;
                load.refresh_utilization();
            }
        }

        if !transfers.is_empty() {
            info!(
                transfers = transfers.len(),
                variance_before,
                variance_after = current_variance,
                "Load rebalanced"
            );
        }

        RebalanceReport {
            triggered: true,
            variance_before,
            variance_after: current_variance,
            transfers,
        }
    }

    /// Indices of agents above the overload threshold, most utilized first
    fn overloaded_by_utilization(&self, snapshot: &[AgentLoad]) -> Vec<usize> {
        let mut overloaded: Vec<usize> = (0..snapshot.len())
            .filter(|&i| {
                utilization(snapshot[i].current_load, snapshot[i].max_capacity)
                    > self.config.overload_threshold
            })
            .collect();
        overloaded.sort_by(|&a, &b| {
            utilization(snapshot[b].current_load, snapshot[b].max_capacity)
                .total_cmp(&utilization(snapshot[a].current_load, snapshot[a].max_capacity))
        });
        overloaded
    }

    /// Underloaded agent with the most capability overlap, then the lowest utilization
    fn pick_underloaded(&self, snapshot: &[AgentLoad], source: usize) -> Option<usize> {
        let source_caps = &snapshot[source].capabilities;

        (0..snapshot.len())
            .filter(|&i| i != source && snapshot[i].available)
            .filter(|&i| {
                utilization(snapshot[i].current_load, snapshot[i].max_capacity)
                    < self.config.underload_threshold
            })
            .max_by(|&a, &b| {
                let overlap_a = snapshot[a].capabilities.intersection(source_caps).count();
                let overlap_b = snapshot[b].capabilities.intersection(source_caps).count();
                let util_a = utilization(snapshot[a].current_load, snapshot[a].max_capacity);
                let util_b = utilization(snapshot[b].current_load, snapshot[b].max_capacity);
                overlap_a
                    .cmp(&overlap_b)
                    .then_with(|| util_b.total_cmp(&util_a))
            })
    }

    /// Start the periodic rebalance timer. Replaces a running timer.
    pub fn start_rebalancing(self: &Arc<Self>) {
        let period = self.config.rebalance_interval();
        let balancer: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(TokioInstant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(balancer) = balancer.upgrade() else {
                    break;
                };
                let report = balancer.rebalance_load();
                debug!(
                    triggered = report.triggered,
                    transfers = report.transfers.len(),
                    "Periodic rebalance"
                );
            }
        });

        if let Some(previous) = self.replace_timer(Some(handle)) {
            previous.abort();
        }
    }

    pub fn stop_rebalancing(&self) {
        if let Some(handle) = self.replace_timer(None) {
            handle.abort();
        }
    }

    fn replace_timer(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.rebalance_task.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, handle),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), handle),
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn get_load_balancing_metrics(&self) -> LoadBalancingMetrics {
        let loads = self.loads();
        let utilizations: Vec<f64> = loads.iter().map(|l| l.utilization_rate).collect();
        let variance = load_variance(&utilizations);
        let average_utilization = if utilizations.is_empty() {
            0.0
        } else {
            utilizations.iter().sum::<f64>() / utilizations.len() as f64
        };

        let waits = self.stats.waits_recorded.load(Ordering::Relaxed);
        let average_wait_time_ms = if waits > 0 {
            self.stats.total_wait_ms.load(Ordering::Relaxed) as f64 / waits as f64
        } else {
            0.0
        };

        let elapsed = self.started_at.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.stats.completed_tasks.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        };

        LoadBalancingMetrics {
            total_tasks: self.stats.total_tasks.load(Ordering::Relaxed),
            active_tasks: loads.iter().map(|l| l.current_load as u64).sum(),
            queued_tasks: loads.iter().map(|l| l.queued_tasks as u64).sum(),
            average_wait_time_ms,
            load_variance: variance,
            throughput,
            efficiency: average_utilization * (1.0 - variance),
            average_utilization,
        }
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.stop_rebalancing();
    }
}
