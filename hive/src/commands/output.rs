//! Output formatting for the CLI

use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use console::{style, Emoji};
use serde::Serialize;

use crate::agents::AgentStatus;
use crate::memory::{AgentEntry, MemoryHealth, MemorySize, QueryHit};
use crate::monitoring::HealthStatus;
use crate::orchestration::HiveStatus;
use crate::specification::{Specification, SpecificationResult, TaskRunStatus};

pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "::");
pub static CHECK: Emoji<'_, '_> = Emoji("✓ ", "OK ");
pub static CROSS: Emoji<'_, '_> = Emoji("✗ ", "ERR");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ ", "i ");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

pub fn success(msg: impl Into<String>) {
    println!("{} {}", style(CHECK).green(), style(msg.into()).green());
}

pub fn error(msg: impl Into<String>) {
    eprintln!("{} {}", style(CROSS).red(), style(msg.into()).red());
}

pub fn info(msg: impl Into<String>) {
    println!("{} {}", style(INFO).cyan(), msg.into());
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_cell(status: TaskRunStatus) -> Cell {
    match status {
        TaskRunStatus::Succeeded => Cell::new("succeeded").fg(Color::Green),
        TaskRunStatus::Failed => Cell::new("failed").fg(Color::Red),
        TaskRunStatus::Skipped => Cell::new("skipped").fg(Color::Yellow),
    }
}

fn agent_status_cell(status: AgentStatus) -> Cell {
    let label = format!("{:?}", status).to_lowercase();
    match status {
        AgentStatus::Idle | AgentStatus::Active => Cell::new(label).fg(Color::Green),
        AgentStatus::Busy => Cell::new(label).fg(Color::Yellow),
        AgentStatus::Error | AgentStatus::Offline => Cell::new(label).fg(Color::Red),
    }
}

fn health_label(status: HealthStatus) -> String {
    let label = format!("{:?}", status).to_lowercase();
    match status {
        HealthStatus::Healthy => style(label).green().to_string(),
        HealthStatus::Degraded => style(label).yellow().to_string(),
        HealthStatus::Critical | HealthStatus::Offline => style(label).red().to_string(),
    }
}

pub fn print_specification(spec: &Specification, used_fallback: bool) {
    println!("\n{} {} ({})\n", SPARKLE, style(&spec.title).bold(), spec.id);
    if used_fallback {
        info("Input was incomplete; using the default three-task plan");
    }
    println!("  Priority:     {:?}", spec.priority);
    println!("  Requirements: {}", spec.requirements.len());
    println!("  Duration:     {}h", spec.estimated_duration_hours);
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Task", "Type", "Agent", "Depends On", "Hours"]);
    for task in &spec.tasks {
        table.add_row(vec![
            Cell::new(&task.id),
            Cell::new(task.task_type.as_str()),
            Cell::new(task.assigned_agent_type.as_str()),
            Cell::new(if task.dependencies.is_empty() {
                "-".to_string()
            } else {
                task.dependencies.join(", ")
            }),
            Cell::new(task.estimated_duration_hours),
        ]);
    }
    println!("{table}");
}

pub fn print_result(result: &SpecificationResult) {
    let headline = format!(
        "{} finished in {} ms ({} succeeded, {} failed, {} skipped)",
        result.specification_id,
        result.metrics.total_duration_ms,
        result.metrics.tasks_succeeded,
        result.metrics.tasks_failed,
        result.metrics.tasks_skipped,
    );
    if result.success {
        success(headline);
    } else {
        error(headline);
    }
    println!(
        "  Topology: {}  Strategy: {:?}  Complexity: {:.2}",
        result.topology, result.strategy, result.metrics.complexity
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Task", "Type", "Agent", "Status", "Duration", "Detail"]);
    for outcome in &result.task_results {
        let (duration, detail) = match &outcome.result {
            Some(r) => (
                format!("{} ms", r.duration_ms),
                r.error.clone().unwrap_or_else(|| format!("{} tokens", r.tokens_used)),
            ),
            None => ("-".to_string(), outcome.reason.clone().unwrap_or_default()),
        };
        table.add_row(vec![
            Cell::new(&outcome.task_id),
            Cell::new(outcome.task_type.as_str()),
            Cell::new(outcome.agent_id.as_str()),
            status_cell(outcome.status),
            Cell::new(duration),
            Cell::new(detail),
        ]);
    }
    println!("{table}");
}

pub fn print_hive_status(status: &HiveStatus) {
    println!("\n{} Hive Status\n", SPARKLE);
    println!("  Initialized:   {}", status.initialized);
    println!("  Agents:        {} active / {} total", status.active_agents, status.total_agents);
    println!("  Tasks:         {} active, {} completed", status.active_tasks, status.completed_tasks);
    println!("  Success rate:  {:.1}%", status.performance.success_rate * 100.0);
    println!("  Avg response:  {:.0} ms", status.performance.average_response_time_ms);
    println!("  Memory:        {} bytes", status.performance.memory_usage);
    println!("  Health:        {}", health_label(status.health.status));
    for issue in &status.health.issues {
        println!("    - {}", issue);
    }
    println!();
}

pub fn print_memory_status(size: &MemorySize, health: &MemoryHealth) {
    println!("\n{} Memory Store\n", SPARKLE);
    println!("  Specifications:    {}", size.specifications);
    println!("  Execution results: {}", size.execution_results);
    println!("  Agents:            {}", size.agents);
    println!("  Task executions:   {}", size.task_executions);
    println!("  Size:              {} bytes", size.bytes);
    if health.healthy {
        println!("  Health:            {}", style("healthy").green());
    } else {
        println!("  Health:            {}", style("issues found").red());
        for issue in &health.issues {
            println!("    - {}", issue);
        }
    }
    println!();
}

pub fn print_agent_table(agents: &[AgentEntry]) {
    if agents.is_empty() {
        info("No agents found");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Type", "Status", "Tasks", "Success Rate", "Created"]);
    for entry in agents {
        table.add_row(vec![
            Cell::new(entry.agent.id.as_str()),
            Cell::new(entry.agent.agent_type.as_str()),
            agent_status_cell(entry.agent.status),
            Cell::new(entry.tasks_recorded),
            Cell::new(format!("{:.1}%", entry.success_rate * 100.0)),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
}

pub fn print_query_hits(hits: &[QueryHit]) {
    if hits.is_empty() {
        info("No matching entries");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Score", "Category", "ID"]);
    for hit in hits {
        table.add_row(vec![
            Cell::new(hit.score),
            Cell::new(hit.category.to_string()),
            Cell::new(&hit.id),
        ]);
    }
    println!("{table}");
}
