//! Hive CLI - run specifications through the agent hive and inspect its memory.
//!
//! # Usage
//!
//! ```bash
//! # Parse and orchestrate a specification
//! hive run spec.txt
//!
//! # Show how a specification parses
//! hive parse spec.txt --format json
//!
//! # Inspect the persistent memory store
//! hive status
//! hive agents
//! hive query "payment gateway" --limit 20
//! hive clear
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use hive::commands::{self, output::OutputFormat};
use hive::config::ENV_LOG_LEVEL;

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Hive - specification-driven agent orchestration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "HIVE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Memory store file, overriding the configuration
    #[arg(short, long, global = true)]
    memory: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a specification and orchestrate it
    Run {
        /// Specification text file
        spec: PathBuf,
    },

    /// Parse a specification and print the result
    Parse {
        /// Specification text file
        spec: PathBuf,
    },

    /// Memory store size and health
    Status,

    /// Agents recorded in the memory store
    Agents,

    /// Search the memory store
    Query {
        /// Text to search for (case-insensitive)
        text: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Delete the memory store
    Clear,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<bool> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = OutputFormat::from(cli.format);

    if let Commands::Parse { spec } = &cli.command {
        commands::parse_file(spec, format).await?;
        return Ok(true);
    }

    let config = commands::load_config(cli.config.as_deref(), cli.memory)?;

    match cli.command {
        Commands::Run { spec } => return commands::run_specification(&spec, config, format).await,
        Commands::Parse { .. } => {}
        Commands::Status => commands::show_status(config, format).await?,
        Commands::Agents => commands::list_agents(config, format).await?,
        Commands::Query { text, limit } => commands::query_memory(config, &text, limit, format).await?,
        Commands::Clear => commands::clear_memory(config).await?,
        Commands::Config => commands::print_config(&config)?,
    }

    Ok(true)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("hive=debug,info")
    } else if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hive=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
