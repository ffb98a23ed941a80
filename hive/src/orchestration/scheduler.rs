//! Specification execution
//!
//! Turns a specification into an assignment plan and runs it with one of
//! three strategies:
//!
//! - `Sequential`: stable topological order, one task at a time. A failed
//!   implementation task halts the rest of the sequence.
//! - `ParallelWithDependencies`: dependency waves, each wave run concurrently.
//! - `Parallel`: every task at once, dependencies ignored.
//!
//! In the first two strategies a task whose dependency did not succeed is skipped.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::*;
use crate::balancer::{TaskAssignment, TaskRequest};
use crate::memory::TaskExecutionRecord;
use crate::specification::{
    ExecutionResult, ExecutionStrategy, ResultMetrics, Specification, SpecificationAnalysis,
    SpecificationResult, TaskDefinition, TaskOutcome, TaskRunStatus, TaskType,
};

/// A task bound to the agent that will run it
struct PlannedTask<'a> {
    task: &'a TaskDefinition,
    /// Balancer key, unique per run
    key: String,
    assignment: TaskAssignment,
}

impl Orchestrator {
    /// Analyze, plan, execute and record a specification.
    ///
    /// Task failures are reported inside the result; only failures before
    /// execution starts are returned as errors.
    pub async fn orchestrate_specification(&self, spec: &Specification) -> Result<SpecificationResult> {
        let runtime = self.runtime("orchestrate_specification").await?;
        let started = Instant::now();

        let graph = TaskGraph::build(&spec.tasks)?;
        runtime.memory.store_specification(spec).await?;

        let analysis = SpecificationAnalysis::analyze(spec);
        let topology = runtime.config.orchestrator.topology.unwrap_or(analysis.topology);
        let strategy = runtime
            .config
            .orchestrator
            .mode
            .fixed_strategy()
            .unwrap_or_else(|| ExecutionStrategy::from(topology));

        info!(
            specification_id = %spec.id,
            tasks = spec.tasks.len(),
            complexity = analysis.complexity,
            topology = %topology,
            strategy = ?strategy,
            "Orchestrating specification"
        );
        self.publish(HiveEvent::SpecificationStarted {
            specification_id: spec.id.clone(),
            complexity: analysis.complexity,
            topology,
        });

        let plan = self.build_plan(&runtime, spec).await?;

        let outcomes = match strategy {
            ExecutionStrategy::Sequential => self.run_sequential(&runtime, spec, &graph, &plan).await,
            ExecutionStrategy::ParallelWithDependencies => {
                self.run_waves(&runtime, spec, &graph, &plan).await
            }
            ExecutionStrategy::Parallel => self.run_parallel(&runtime, spec, &plan).await,
        };

        let result = aggregate(spec, &plan, outcomes, topology, strategy, analysis.complexity, started);

        if let Err(e) = runtime.memory.store_execution_result(&result).await {
            warn!(specification_id = %spec.id, error = %e, "Failed to persist specification result");
        }

        self.publish(HiveEvent::SpecificationCompleted {
            specification_id: spec.id.clone(),
            success: result.success,
            duration_ms: result.metrics.total_duration_ms,
        });
        info!(
            specification_id = %spec.id,
            success = result.success,
            succeeded = result.metrics.tasks_succeeded,
            failed = result.metrics.tasks_failed,
            skipped = result.metrics.tasks_skipped,
            "Specification finished"
        );

        Ok(result)
    }

    // ========================================================================
    // Planning
    // ========================================================================

    async fn build_plan<'a>(&self, runtime: &HiveRuntime, spec: &'a Specification) -> Result<Vec<PlannedTask<'a>>> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let mut plan: Vec<PlannedTask<'a>> = Vec::with_capacity(spec.tasks.len());

        for task in &spec.tasks {
            let key = format!("{}:{}", run_id, task.id);
            let request = TaskRequest::for_task(key.clone(), task, spec.priority);

            match self.assign(runtime, &request).await {
                Ok(assignment) => {
                    self.publish(HiveEvent::TaskAssigned {
                        task_id: task.id.clone(),
                        agent_id: assignment.agent_id.clone(),
                        confidence: assignment.confidence,
                    });
                    debug!(
                        task_id = %task.id,
                        agent_id = %assignment.agent_id,
                        reasoning = %assignment.reasoning,
                        "Task planned"
                    );
                    plan.push(PlannedTask { task, key, assignment });
                }
                Err(e) => {
                    for planned in &plan {
                        runtime.balancer.cancel_task(&planned.key);
                    }
                    return Err(e);
                }
            }
        }

        Ok(plan)
    }

    /// Ranked assignment, then a freshly spawned agent, then overflow placement
    async fn assign(&self, runtime: &HiveRuntime, request: &TaskRequest) -> Result<TaskAssignment> {
        if let Ok(assignment) = runtime.balancer.assign_task(request) {
            return Ok(assignment);
        }

        let agent_type = request
            .agent_type
            .ok_or_else(|| OrchestrationError::InvalidRequest(format!("task {} has no agent type", request.task_id)))?;

        match self.spawn_agent(runtime, agent_type, None).await {
            Ok(agent) => {
                debug!(agent_id = %agent.id, task_id = %request.task_id, "Spawned agent for task");
                if let Ok(assignment) = runtime.balancer.assign_task(request) {
                    return Ok(assignment);
                }
            }
            Err(OrchestrationError::CapacityExceeded { requested, limit }) => {
                warn!(
                    task_id = %request.task_id,
                    agent_type = %agent_type,
                    requested,
                    limit,
                    "Agent pool full, falling back to overflow placement"
                );
            }
            Err(e) => return Err(e),
        }

        Ok(runtime.balancer.assign_overflow(request)?)
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    async fn run_sequential(
        &self,
        runtime: &HiveRuntime,
        spec: &Specification,
        graph: &TaskGraph,
        plan: &[PlannedTask<'_>],
    ) -> Vec<TaskOutcome> {
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; plan.len()];
        let mut halted_by: Option<String> = None;

        for index in graph.topological_order() {
            let planned = &plan[index];

            let skip_reason = match &halted_by {
                Some(task_id) => Some(format!("sequence halted after implementation task {} failed", task_id)),
                None => unmet_dependency(graph, index, &outcomes),
            };

            let outcome = match skip_reason {
                Some(reason) => self.skip_task(runtime, planned, reason),
                None => self.run_task(runtime, spec, planned).await,
            };

            if outcome.status == TaskRunStatus::Failed && planned.task.task_type == TaskType::Implementation {
                halted_by = Some(planned.task.id.clone());
            }
            outcomes[index] = Some(outcome);
        }

        outcomes.into_iter().flatten().collect()
    }

    async fn run_waves(
        &self,
        runtime: &HiveRuntime,
        spec: &Specification,
        graph: &TaskGraph,
        plan: &[PlannedTask<'_>],
    ) -> Vec<TaskOutcome> {
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; plan.len()];

        for wave in graph.waves() {
            let mut runnable = Vec::with_capacity(wave.len());
            for index in wave {
                match unmet_dependency(graph, index, &outcomes) {
                    Some(reason) => outcomes[index] = Some(self.skip_task(runtime, &plan[index], reason)),
                    None => runnable.push(index),
                }
            }

            let results = join_all(
                runnable
                    .iter()
                    .map(|&index| self.run_task(runtime, spec, &plan[index])),
            )
            .await;

            for (index, outcome) in runnable.into_iter().zip(results) {
                outcomes[index] = Some(outcome);
            }
        }

        outcomes.into_iter().flatten().collect()
    }

    async fn run_parallel(
        &self,
        runtime: &HiveRuntime,
        spec: &Specification,
        plan: &[PlannedTask<'_>],
    ) -> Vec<TaskOutcome> {
        join_all(plan.iter().map(|planned| self.run_task(runtime, spec, planned))).await
    }

    // ========================================================================
    // Task Execution
    // ========================================================================

    async fn run_task(&self, runtime: &HiveRuntime, spec: &Specification, planned: &PlannedTask<'_>) -> TaskOutcome {
        let task = planned.task;
        let agent_id = &planned.assignment.agent_id;

        let agent = runtime.agents.get_mut(agent_id).and_then(|mut slot| {
            slot.active_mut().map(|agent| {
                agent.status = AgentStatus::Busy;
                agent.last_active = Utc::now();
                agent.clone()
            })
        });
        let Some(agent) = agent else {
            return self.skip_task(runtime, planned, format!("agent {} is no longer active", agent_id));
        };

        runtime.balancer.mark_started(&planned.key);
        self.publish(HiveEvent::TaskStarted {
            task_id: task.id.clone(),
            agent_id: agent_id.clone(),
        });

        let timeout = runtime.config.orchestrator.task_timeout();
        let started = Instant::now();
        let execution = tokio::time::timeout(timeout, self.executor().execute(task, &agent)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut agent_failed = false;
        let result = match execution {
            Ok(Ok(output)) => ExecutionResult {
                success: true,
                output: output.output,
                duration_ms,
                tokens_used: output.tokens_used,
                error: None,
            },
            Ok(Err(ExecutorError::TaskFailed(reason))) => ExecutionResult::failure(reason, duration_ms),
            Ok(Err(ExecutorError::AgentUnavailable(reason))) => {
                agent_failed = true;
                ExecutionResult::failure(format!("agent unavailable: {}", reason), duration_ms)
            }
            Err(_) => ExecutionResult::failure(
                format!("timed out after {}s", timeout.as_secs()),
                duration_ms,
            ),
        };

        self.finish_task(runtime, spec, planned, &result, agent_failed).await;

        TaskOutcome {
            task_id: task.id.clone(),
            task_type: task.task_type,
            agent_id: agent_id.clone(),
            status: if result.success {
                TaskRunStatus::Succeeded
            } else {
                TaskRunStatus::Failed
            },
            result: Some(result),
            reason: None,
        }
    }

    /// Release load, update the agent and persist the execution
    async fn finish_task(
        &self,
        runtime: &HiveRuntime,
        spec: &Specification,
        planned: &PlannedTask<'_>,
        result: &ExecutionResult,
        agent_failed: bool,
    ) {
        let task = planned.task;
        let agent_id = &planned.assignment.agent_id;

        if let Err(e) = runtime
            .balancer
            .complete_task(&planned.key, agent_id, result.success, result.duration_ms)
        {
            debug!(task_id = %task.id, error = %e, "Load release skipped");
        }
        if agent_failed {
            if let Err(e) = runtime.balancer.set_availability(agent_id, false) {
                debug!(task_id = %task.id, error = %e, "Availability update skipped");
            }
        }

        let still_loaded = runtime
            .balancer
            .agent_load(agent_id)
            .is_some_and(|load| load.current_load > 0);
        let alpha = runtime.config.load_balancer.ema_alpha;

        if let Some(mut slot) = runtime.agents.get_mut(agent_id) {
            if let Some(agent) = slot.active_mut() {
                agent.performance.record(result.success, result.duration_ms, alpha);
                agent.last_active = Utc::now();
                agent.status = if agent_failed {
                    AgentStatus::Error
                } else if still_loaded {
                    AgentStatus::Busy
                } else {
                    AgentStatus::Idle
                };
            }
        }

        self.metrics()
            .record_task_completion(result.duration_ms, result.tokens_used, result.success);

        let mut record = TaskExecutionRecord::new(&task.id, task.task_type, agent_id.clone(), result.success)
            .for_specification(&spec.id)
            .with_duration(result.duration_ms);
        record.tokens_used = result.tokens_used;
        record.output = result.output.clone();
        record.error = result.error.clone();

        if let Err(e) = runtime.memory.store_task_execution(record).await {
            warn!(task_id = %task.id, error = %e, "Failed to persist task execution");
        }

        if result.success {
            self.publish(HiveEvent::TaskCompleted {
                task_id: task.id.clone(),
                agent_id: agent_id.clone(),
                duration_ms: result.duration_ms,
            });
        } else {
            let error = OrchestrationError::TaskExecution {
                task_id: task.id.clone(),
                reason: result.error.clone().unwrap_or_default(),
            };
            warn!(agent_id = %agent_id, error = %error, "Task failed");
            self.publish(HiveEvent::TaskFailed {
                task_id: task.id.clone(),
                agent_id: agent_id.clone(),
                error: error.to_string(),
            });
        }
    }

    fn skip_task(&self, runtime: &HiveRuntime, planned: &PlannedTask<'_>, reason: String) -> TaskOutcome {
        runtime.balancer.cancel_task(&planned.key);

        debug!(task_id = %planned.task.id, reason = %reason, "Task skipped");
        self.publish(HiveEvent::TaskSkipped {
            task_id: planned.task.id.clone(),
            reason: reason.clone(),
        });

        TaskOutcome {
            task_id: planned.task.id.clone(),
            task_type: planned.task.task_type,
            agent_id: planned.assignment.agent_id.clone(),
            status: TaskRunStatus::Skipped,
            result: None,
            reason: Some(reason),
        }
    }
}

/// Reason to skip a task whose dependencies did not all succeed
fn unmet_dependency(graph: &TaskGraph, index: usize, outcomes: &[Option<TaskOutcome>]) -> Option<String> {
    graph.dependencies(index).iter().find_map(|&dep| {
        let succeeded = outcomes[dep]
            .as_ref()
            .is_some_and(|o| o.status == TaskRunStatus::Succeeded);
        (!succeeded).then(|| format!("dependency {} did not succeed", graph.id(dep)))
    })
}

fn aggregate(
    spec: &Specification,
    plan: &[PlannedTask<'_>],
    outcomes: Vec<TaskOutcome>,
    topology: crate::coordination::Topology,
    strategy: ExecutionStrategy,
    complexity: f64,
    started: Instant,
) -> SpecificationResult {
    let mut metrics = ResultMetrics {
        total_duration_ms: started.elapsed().as_millis() as u64,
        complexity,
        ..ResultMetrics::default()
    };

    let mut sections = Vec::new();
    for outcome in &outcomes {
        match outcome.status {
            TaskRunStatus::Succeeded => metrics.tasks_succeeded += 1,
            TaskRunStatus::Failed => metrics.tasks_failed += 1,
            TaskRunStatus::Skipped => metrics.tasks_skipped += 1,
        }
        if let Some(result) = &outcome.result {
            metrics.tokens_used += result.tokens_used;
            let body = match &result.error {
                Some(error) => format!("FAILED: {}", error),
                None => result.output.clone(),
            };
            sections.push(format!("[{}] {}", outcome.task_id, body));
        }
    }

    let mut agents_used = Vec::new();
    let mut seen = HashSet::new();
    for planned in plan {
        let id = &planned.assignment.agent_id;
        if seen.insert(id.clone()) {
            agents_used.push(id.clone());
        }
    }

    SpecificationResult {
        specification_id: spec.id.clone(),
        success: outcomes
            .iter()
            .filter(|o| o.attempted())
            .all(|o| o.status == TaskRunStatus::Succeeded),
        output: sections.join("\n"),
        task_results: outcomes,
        agents_used,
        topology,
        strategy,
        metrics,
        completed_at: Utc::now(),
    }
}
