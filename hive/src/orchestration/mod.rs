//! Orchestration Engine
//!
//! Owns the agent registry, spawns and parks agents, decomposes a
//! specification into an assignment plan, drives execution through a
//! pluggable [`TaskExecutor`], and aggregates results.
//!
//! # Features
//!
//! - Protected coordinator agent created at initialization
//! - Seed agent pool and on-demand specialized agents
//! - Capacity management by parking the least recently active idle agent
//! - Sequential, dependency-wave and fully parallel execution
//! - Periodic health assessment and typed event notifications

use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentRecord, AgentSlot, AgentStatus, AgentType};
use crate::balancer::{BalancerError, LoadBalancer};
use crate::config::{HiveConfig, OrchestratorConfig};
use crate::coordination::{EventBus, HiveEvent};
use crate::memory::{AgentContext, MemoryError, MemoryStore, QueryHit};
use crate::monitoring::{HealthReport, MetricsCollector};

pub mod executor;
pub mod dag;
pub mod scheduler;
pub mod status;

pub use executor::*;
pub use dag::*;
pub use status::*;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Failed to initialize {component}: {reason}")]
    Initialization {
        component: &'static str,
        reason: String,
    },

    #[error("Orchestrator not initialized (operation: {operation})")]
    NotInitialized { operation: &'static str },

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Agent capacity exceeded: {requested} active agents requested, limit is {limit}")]
    CapacityExceeded { requested: usize, limit: usize },

    #[error("Agent {0} is the coordinator and cannot be terminated")]
    ProtectedAgent(AgentId),

    #[error("Task {task_id} failed: {reason}")]
    TaskExecution { task_id: String, reason: String },

    #[error("Cycle detected in task dependencies at {task_id}")]
    CycleDetected { task_id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Memory store error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Load balancer error: {0}")]
    Balancer(#[from] BalancerError),
}

/// State that exists only between `initialize` and `shutdown`
#[derive(Clone)]
pub(crate) struct HiveRuntime {
    pub(crate) config: Arc<HiveConfig>,
    pub(crate) memory: Arc<MemoryStore>,
    pub(crate) balancer: Arc<LoadBalancer>,
    pub(crate) agents: Arc<DashMap<AgentId, AgentSlot>>,
    pub(crate) coordinator_id: AgentId,
    /// Serializes pool-size changes (spawn, park, reactivate)
    pub(crate) pool_lock: Arc<tokio::sync::Mutex<()>>,
}

pub struct Orchestrator {
    executor: Arc<dyn TaskExecutor>,
    events: EventBus,
    metrics: MetricsCollector,
    runtime: RwLock<Option<HiveRuntime>>,
    health: RwLock<HealthReport>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Arc<Self> {
        Self::with_event_capacity(executor, OrchestratorConfig::default().event_capacity)
    }

    pub fn with_event_capacity(executor: Arc<dyn TaskExecutor>, event_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            executor,
            events: EventBus::new(event_capacity),
            metrics: MetricsCollector::new(),
            runtime: RwLock::new(None),
            health: RwLock::new(HealthReport::offline()),
            health_task: Mutex::new(None),
        })
    }

    /// Subscribe to hive events
    pub fn subscribe(&self) -> broadcast::Receiver<HiveEvent> {
        self.events.subscribe()
    }

    pub async fn is_initialized(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    pub(crate) async fn runtime(&self, operation: &'static str) -> Result<HiveRuntime> {
        self.runtime
            .read()
            .await
            .clone()
            .ok_or(OrchestrationError::NotInitialized { operation })
    }

    pub(crate) fn publish(&self, event: HiveEvent) {
        self.events.publish(event);
    }

    pub(crate) fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the memory store, create the coordinator and the seed pool, and
    /// start the background timers. A second call is a no-op.
    pub async fn initialize(self: &Arc<Self>, config: HiveConfig) -> Result<()> {
        let mut slot = self.runtime.write().await;
        if slot.is_some() {
            warn!("Orchestrator already initialized; ignoring initialize call");
            return Ok(());
        }

        config.validate().map_err(|e| OrchestrationError::Initialization {
            component: "config",
            reason: e.to_string(),
        })?;

        let memory = Arc::new(MemoryStore::new(config.memory.clone()));
        memory
            .initialize()
            .await
            .map_err(|e| OrchestrationError::Initialization {
                component: "memory store",
                reason: e.to_string(),
            })?;

        let coordinator = AgentRecord::new(AgentType::Coordinator, None);
        let mut pool = vec![coordinator.clone()];
        for seed in &config.orchestrator.seed_pool {
            for _ in 0..seed.count {
                pool.push(AgentRecord::new(seed.agent_type, None));
            }
        }

        let agents = Arc::new(DashMap::new());
        for agent in &pool {
            memory.store_agent_creation(agent).await.map_err(|e| {
                OrchestrationError::Initialization {
                    component: "memory store",
                    reason: e.to_string(),
                }
            })?;
            agents.insert(agent.id.clone(), AgentSlot::Active(agent.clone()));
        }

        let balancer = Arc::new(LoadBalancer::new(config.load_balancer.clone()));
        balancer.initialize_agents(&pool);
        balancer.start_rebalancing();

        let health_interval = config.orchestrator.health_check_interval();
        *slot = Some(HiveRuntime {
            config: Arc::new(config),
            memory,
            balancer,
            agents,
            coordinator_id: coordinator.id.clone(),
            pool_lock: Arc::new(tokio::sync::Mutex::new(())),
        });
        drop(slot);

        *self.health.write().await = HealthReport::from_issues(Vec::new());
        self.start_health_checks(health_interval);

        for agent in pool.iter().skip(1) {
            self.publish(HiveEvent::AgentSpawned {
                agent_id: agent.id.clone(),
                agent_type: agent.agent_type,
            });
        }
        self.publish(HiveEvent::HiveInitialized {
            coordinator_id: coordinator.id.clone(),
            agent_count: pool.len(),
        });

        info!(
            coordinator_id = %coordinator.id,
            agents = pool.len(),
            "Hive initialized"
        );
        Ok(())
    }

    /// Stop timers, close the memory store and return to the uninitialized state
    pub async fn shutdown(&self) -> Result<()> {
        let Some(runtime) = self.runtime.write().await.take() else {
            return Ok(());
        };

        self.stop_health_checks();
        runtime.balancer.stop_rebalancing();
        *self.health.write().await = HealthReport::offline();

        let disposed = runtime.memory.dispose().await;
        self.publish(HiveEvent::HiveShutdown);
        info!("Hive shut down");

        disposed.map_err(OrchestrationError::from)
    }

    // ========================================================================
    // Agent Management
    // ========================================================================

    /// Spawn an agent of the given type, parking an idle agent if the pool is full
    pub async fn spawn_specialized_agent(
        &self,
        agent_type: AgentType,
        capabilities: Option<Vec<String>>,
    ) -> Result<AgentRecord> {
        let runtime = self.runtime("spawn_specialized_agent").await?;
        if agent_type == AgentType::Coordinator {
            return Err(OrchestrationError::InvalidRequest(
                "the hive has exactly one coordinator".to_string(),
            ));
        }
        self.spawn_agent(&runtime, agent_type, capabilities).await
    }

    pub(crate) async fn spawn_agent(
        &self,
        runtime: &HiveRuntime,
        agent_type: AgentType,
        capabilities: Option<Vec<String>>,
    ) -> Result<AgentRecord> {
        let _pool = runtime.pool_lock.lock().await;
        self.ensure_capacity(runtime).await?;

        let agent = AgentRecord::new(agent_type, capabilities);
        runtime.memory.store_agent_creation(&agent).await?;
        runtime.agents.insert(agent.id.clone(), AgentSlot::Active(agent.clone()));
        runtime.balancer.register_agent(&agent);

        self.publish(HiveEvent::AgentSpawned {
            agent_id: agent.id.clone(),
            agent_type,
        });
        info!(agent_id = %agent.id, agent_type = %agent_type, "Spawned agent");
        Ok(agent)
    }

    /// Make room for one more active agent. Caller holds the pool lock.
    async fn ensure_capacity(&self, runtime: &HiveRuntime) -> Result<()> {
        let limit = runtime.config.orchestrator.max_agents;
        let active = runtime.agents.iter().filter(|slot| slot.is_active()).count();
        if active < limit {
            return Ok(());
        }

        let exhausted = OrchestrationError::CapacityExceeded {
            requested: active + 1,
            limit,
        };

        let Some(candidate) = self.parking_candidate(runtime) else {
            return Err(exhausted);
        };

        // Hide the candidate from assignment, then confirm it is still idle
        if runtime.balancer.set_availability(&candidate, false).is_err() {
            return Err(exhausted);
        }
        let idle = runtime
            .balancer
            .agent_load(&candidate)
            .is_some_and(|load| load.current_load == 0);
        if !idle {
            let _ = runtime.balancer.set_availability(&candidate, true);
            return Err(exhausted);
        }

        self.park_agent(runtime, &candidate).await;
        Ok(())
    }

    /// Idle non-coordinator agent with the oldest `last_active`
    fn parking_candidate(&self, runtime: &HiveRuntime) -> Option<AgentId> {
        let idle: Vec<_> = runtime
            .agents
            .iter()
            .filter_map(|slot| match slot.value() {
                AgentSlot::Active(agent)
                    if !agent.is_coordinator() && agent.status == AgentStatus::Idle =>
                {
                    Some((agent.last_active, agent.id.clone()))
                }
                _ => None,
            })
            .collect();

        idle.into_iter()
            .filter(|(_, id)| {
                runtime
                    .balancer
                    .agent_load(id)
                    .is_some_and(|load| load.current_load == 0)
            })
            .min()
            .map(|(_, id)| id)
    }

    async fn park_agent(&self, runtime: &HiveRuntime, agent_id: &AgentId) {
        let context = match runtime.memory.get_agent_context(agent_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "No memory context for parked agent");
                AgentContext::empty(agent_id.clone())
            }
        };

        runtime.balancer.remove_agent(agent_id);
        let Some((id, slot)) = runtime.agents.remove(agent_id) else {
            return;
        };
        if let Some(snapshot) = slot.into_dormant(context) {
            runtime.agents.insert(id, AgentSlot::Dormant(snapshot));
        }

        self.publish(HiveEvent::AgentDormant {
            agent_id: agent_id.clone(),
        });
        info!(agent_id = %agent_id, "Agent moved to dormant pool");
    }

    /// Bring a dormant agent back into the active pool.
    ///
    /// Returns the reactivated record and the context captured when it was parked.
    pub async fn reactivate_agent(&self, agent_id: &AgentId) -> Result<(AgentRecord, AgentContext)> {
        let runtime = self.runtime("reactivate_agent").await?;
        let _pool = runtime.pool_lock.lock().await;

        match runtime.agents.get(agent_id).map(|slot| slot.is_active()) {
            None => return Err(OrchestrationError::AgentNotFound(agent_id.clone())),
            Some(true) => {
                return Err(OrchestrationError::InvalidRequest(format!(
                    "agent {} is already active",
                    agent_id
                )));
            }
            Some(false) => {}
        }

        self.ensure_capacity(&runtime).await?;

        let Some((id, AgentSlot::Dormant(snapshot))) = runtime.agents.remove(agent_id) else {
            return Err(OrchestrationError::AgentNotFound(agent_id.clone()));
        };
        let (agent, context) = snapshot.reactivate();

        runtime.agents.insert(id, AgentSlot::Active(agent.clone()));
        runtime.balancer.register_agent(&agent);
        if let Err(e) = runtime.memory.store_agent_creation(&agent).await {
            warn!(agent_id = %agent.id, error = %e, "Failed to persist reactivated agent");
        }

        self.publish(HiveEvent::AgentReactivated {
            agent_id: agent.id.clone(),
        });
        info!(agent_id = %agent.id, "Agent reactivated");
        Ok((agent, context))
    }

    /// Remove an agent from every registry. The coordinator is protected.
    pub async fn terminate_agent(&self, agent_id: &AgentId) -> Result<()> {
        let runtime = self.runtime("terminate_agent").await?;
        if agent_id == &runtime.coordinator_id {
            return Err(OrchestrationError::ProtectedAgent(agent_id.clone()));
        }

        let _pool = runtime.pool_lock.lock().await;
        if runtime.agents.remove(agent_id).is_none() {
            return Err(OrchestrationError::AgentNotFound(agent_id.clone()));
        }
        runtime.balancer.remove_agent(agent_id);

        self.publish(HiveEvent::AgentTerminated {
            agent_id: agent_id.clone(),
        });
        info!(agent_id = %agent_id, "Agent terminated");
        Ok(())
    }

    /// Active agents, oldest first
    pub async fn get_active_agents(&self) -> Result<Vec<AgentRecord>> {
        let runtime = self.runtime("get_active_agents").await?;
        let mut agents: Vec<AgentRecord> = runtime
            .agents
            .iter()
            .filter_map(|slot| match slot.value() {
                AgentSlot::Active(agent) => Some(agent.clone()),
                AgentSlot::Dormant(_) => None,
            })
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(agents)
    }

    pub async fn get_dormant_agents(&self) -> Result<Vec<AgentRecord>> {
        let runtime = self.runtime("get_dormant_agents").await?;
        let mut agents: Vec<AgentRecord> = runtime
            .agents
            .iter()
            .filter(|slot| !slot.is_active())
            .map(|slot| slot.record().clone())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    pub async fn coordinator_id(&self) -> Result<AgentId> {
        Ok(self.runtime("coordinator_id").await?.coordinator_id)
    }

    pub async fn load_balancer(&self) -> Result<Arc<LoadBalancer>> {
        Ok(self.runtime("load_balancer").await?.balancer)
    }

    // ========================================================================
    // Memory Bank
    // ========================================================================

    pub async fn query_memory_bank(&self, text: &str, limit: usize) -> Result<Vec<QueryHit>> {
        let runtime = self.runtime("query_memory_bank").await?;
        Ok(runtime.memory.query(text, limit).await?)
    }

    pub async fn get_completed_task_count(&self) -> Result<usize> {
        let runtime = self.runtime("get_completed_task_count").await?;
        Ok(runtime.memory.get_completed_task_count().await?)
    }

    /// Discard the memory store and reopen an empty one with the same settings.
    ///
    /// Records of the current agents are written to the fresh store so later
    /// task executions keep valid references.
    pub async fn clear_memory_bank(&self) -> Result<()> {
        let mut slot = self.runtime.write().await;
        let runtime = slot.as_mut().ok_or(OrchestrationError::NotInitialized {
            operation: "clear_memory_bank",
        })?;

        runtime.memory.purge().await?;

        let memory = Arc::new(MemoryStore::new(runtime.config.memory.clone()));
        memory
            .initialize()
            .await
            .map_err(|e| OrchestrationError::Initialization {
                component: "memory store",
                reason: e.to_string(),
            })?;

        let agents: Vec<AgentRecord> = runtime.agents.iter().map(|s| s.record().clone()).collect();
        for agent in &agents {
            memory.store_agent_creation(agent).await?;
        }

        runtime.memory = memory;
        drop(slot);

        self.publish(HiveEvent::MemoryCleared);
        info!("Memory bank cleared");
        Ok(())
    }

    // ========================================================================
    // Status and Health
    // ========================================================================

    pub async fn get_hive_status(&self) -> HiveStatus {
        let Ok(runtime) = self.runtime("get_hive_status").await else {
            return HiveStatus::offline();
        };

        let (mut active, mut total, mut efficiency_sum) = (0usize, 0usize, 0.0);
        for slot in runtime.agents.iter() {
            total += 1;
            if let AgentSlot::Active(agent) = slot.value() {
                active += 1;
                efficiency_sum += agent.performance.token_efficiency;
            }
        }

        let balance = runtime.balancer.get_load_balancing_metrics();
        let snapshot = self.metrics.snapshot();
        let completed_tasks = runtime.memory.get_completed_task_count().await.unwrap_or_else(|e| {
            debug!(error = %e, "Completed task count unavailable");
            0
        });
        let memory_usage = runtime.memory.get_size().await.map(|s| s.bytes).unwrap_or_default();

        HiveStatus {
            initialized: true,
            active_agents: active,
            total_agents: total,
            active_tasks: balance.active_tasks,
            completed_tasks,
            performance: HivePerformance {
                tasks_per_second: snapshot.tasks_per_second,
                average_response_time_ms: snapshot.avg_duration_ms,
                token_efficiency: if active > 0 {
                    efficiency_sum / active as f64
                } else {
                    0.0
                },
                success_rate: snapshot.success_rate,
                cpu_usage: balance.average_utilization,
                memory_usage,
            },
            health: self.health.read().await.clone(),
        }
    }

    /// Assess hive health now. Issues are reported, never repaired.
    pub async fn check_health(&self) -> HealthReport {
        let Ok(runtime) = self.runtime("check_health").await else {
            return HealthReport::offline();
        };

        let mut issues: Vec<String> = runtime
            .agents
            .iter()
            .filter_map(|slot| match slot.value() {
                AgentSlot::Active(agent) if agent.status == AgentStatus::Error => {
                    Some(format!("agent {} is in error state", agent.id))
                }
                _ => None,
            })
            .collect();
        issues.sort();

        let memory = runtime.memory.check_health().await;
        issues.extend(memory.issues.iter().map(ToString::to_string));

        let report = HealthReport::from_issues(issues);
        if !report.issues.is_empty() {
            warn!(
                status = ?report.status,
                issues = report.issues.len(),
                "Hive health check found issues"
            );
        }

        *self.health.write().await = report.clone();
        self.publish(HiveEvent::HealthChecked {
            status: report.status,
            issues: report.issues.clone(),
        });
        report
    }

    fn start_health_checks(self: &Arc<Self>, period: std::time::Duration) {
        let orchestrator: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                let report = orchestrator.check_health().await;
                debug!(status = ?report.status, "Periodic health check");
            }
        });

        if let Some(previous) = self.replace_health_task(Some(handle)) {
            previous.abort();
        }
    }

    fn stop_health_checks(&self) {
        if let Some(handle) = self.replace_health_task(None) {
            handle.abort();
        }
    }

    fn replace_health_task(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.health_task.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, handle),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), handle),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_health_checks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    fn orchestrator() -> Arc<Orchestrator> {
        Orchestrator::new(Arc::new(SimulatedExecutor::default()))
    }

    fn config() -> HiveConfig {
        let mut config = HiveConfig::default();
        config.memory = MemoryConfig::ephemeral();
        config
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let hive = orchestrator();
        assert!(matches!(
            hive.spawn_specialized_agent(AgentType::Coder, None).await,
            Err(OrchestrationError::NotInitialized { .. })
        ));
        assert!(!hive.get_hive_status().await.initialized);
        assert_eq!(hive.check_health().await.status, crate::monitoring::HealthStatus::Offline);
    }

    #[test]
    fn test_default_event_capacity_follows_config() {
        assert_eq!(orchestrator().events.capacity(), OrchestratorConfig::default().event_capacity);
        assert_eq!(EventBus::default().capacity(), OrchestratorConfig::default().event_capacity);
    }

    #[tokio::test]
    async fn test_initialize_seeds_pool() {
        let hive = orchestrator();
        hive.initialize(config()).await.unwrap();

        let agents = hive.get_active_agents().await.unwrap();
        assert_eq!(agents.len(), 6);
        assert_eq!(agents.iter().filter(|a| a.is_coordinator()).count(), 1);

        // Second call keeps the existing pool
        hive.initialize(config()).await.unwrap();
        assert_eq!(hive.get_active_agents().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_coordinator_is_protected() {
        let hive = orchestrator();
        hive.initialize(config()).await.unwrap();
        let coordinator = hive.coordinator_id().await.unwrap();

        let err = hive.terminate_agent(&coordinator).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ProtectedAgent(_)));
        assert!(matches!(
            hive.spawn_specialized_agent(AgentType::Coordinator, None).await,
            Err(OrchestrationError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_initialize() {
        let hive = orchestrator();
        let mut bad = config();
        bad.orchestrator.max_agents = 2;

        let err = hive.initialize(bad).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Initialization { component: "config", .. }));
        assert!(!hive.is_initialized().await);
    }
}
