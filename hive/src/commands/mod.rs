//! CLI command implementations
//!
//! `run` drives a full orchestration; the remaining commands open the
//! configured memory store directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::HiveConfig;
use crate::memory::MemoryStore;
use crate::orchestration::{Orchestrator, SimulatedExecutor};
use crate::specification::parse_specification_detailed;

pub mod output;

use output::OutputFormat;

/// Default store location when neither config nor flags name one
pub const DEFAULT_MEMORY_PATH: &str = ".hive/memory.json";

/// Resolve configuration: explicit file, then `HIVE_CONFIG_PATH`, then defaults
pub fn load_config(path: Option<&Path>, memory: Option<PathBuf>) -> Result<HiveConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = HiveConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => HiveConfig::from_env_or_default().context("Failed to load configuration")?,
    };

    if let Some(memory) = memory {
        config.memory.path = Some(memory);
    }
    if config.memory.path.is_none() {
        config.memory.path = Some(PathBuf::from(DEFAULT_MEMORY_PATH));
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &HiveConfig) -> Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new(config.memory.clone()));
    store
        .initialize()
        .await
        .with_context(|| format!("Failed to open memory store at {:?}", config.memory.path))?;
    Ok(store)
}

async fn read_spec(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read specification {}", path.display()))
}

pub async fn run_specification(path: &Path, config: HiveConfig, format: OutputFormat) -> Result<bool> {
    let text = read_spec(path).await?;
    let parsed = parse_specification_detailed(&text);

    let executor = Arc::new(SimulatedExecutor::new(config.executor.clone()));
    let hive = Orchestrator::with_event_capacity(executor, config.orchestrator.event_capacity);
    hive.initialize(config).await.context("Failed to initialize hive")?;

    let outcome = hive.orchestrate_specification(&parsed.specification).await;
    let status = hive.get_hive_status().await;
    hive.shutdown().await.context("Failed to shut down hive")?;

    let result = outcome.context("Orchestration failed")?;
    match format {
        OutputFormat::Json => output::print_json(&result)?,
        OutputFormat::Human => {
            if parsed.used_fallback {
                output::info("Specification was incomplete; ran the default three-task plan");
            }
            output::print_result(&result);
            output::print_hive_status(&status);
        }
    }

    Ok(result.success)
}

pub async fn parse_file(path: &Path, format: OutputFormat) -> Result<()> {
    let text = read_spec(path).await?;
    let parsed = parse_specification_detailed(&text);

    match format {
        OutputFormat::Json => output::print_json(&parsed.specification),
        OutputFormat::Human => {
            output::print_specification(&parsed.specification, parsed.used_fallback);
            Ok(())
        }
    }
}

pub async fn show_status(config: HiveConfig, format: OutputFormat) -> Result<()> {
    let store = open_store(&config).await?;
    let size = store.get_size().await?;
    let health = store.check_health().await;
    store.dispose().await?;

    match format {
        OutputFormat::Json => output::print_json(&serde_json::json!({ "size": size, "health": health })),
        OutputFormat::Human => {
            output::print_memory_status(&size, &health);
            Ok(())
        }
    }
}

pub async fn list_agents(config: HiveConfig, format: OutputFormat) -> Result<()> {
    let store = open_store(&config).await?;
    let agents = store.agents().await?;
    store.dispose().await?;

    match format {
        OutputFormat::Json => output::print_json(&agents),
        OutputFormat::Human => {
            output::print_agent_table(&agents);
            Ok(())
        }
    }
}

pub async fn query_memory(config: HiveConfig, text: &str, limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store(&config).await?;
    let hits = store.query(text, limit).await?;
    store.dispose().await?;

    match format {
        OutputFormat::Json => output::print_json(&hits),
        OutputFormat::Human => {
            output::print_query_hits(&hits);
            Ok(())
        }
    }
}

pub async fn clear_memory(config: HiveConfig) -> Result<()> {
    let store = open_store(&config).await?;
    store.purge().await.context("Failed to clear memory store")?;
    output::success("Memory store cleared");
    Ok(())
}

pub fn print_config(config: &HiveConfig) -> Result<()> {
    let rendered = config.to_toml().context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
