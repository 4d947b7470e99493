//! edgemem - operator CLI for a local edge store
//!
//! Stores, reads, searches and maintains the records under a store root.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgemem::{EdgeMemConfig, EdgeStore};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "edgemem")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Bounded, privacy-preserving multi-modal memory store")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "EDGEMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Store root (overrides the configuration file)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Secret the record key is derived from
    #[arg(long, env = "EDGEMEM_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a JSON value as a new record
    Store {
        /// JSON document to store
        json: String,

        /// Do not encrypt the record
        #[arg(long)]
        plain: bool,
    },

    /// Print one record by id
    Get {
        /// Record id (32 hex chars)
        id: String,
    },

    /// Search stored records
    Retrieve {
        /// Search text
        query: String,

        /// Disable fuzzy matching
        #[arg(long)]
        exact: bool,
    },

    /// Delete records older than the given age
    Cleanup {
        /// Maximum record age in seconds
        #[arg(long)]
        older_than_secs: u64,
    },

    /// Show storage usage
    Stats,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("edgemem={}", log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => EdgeMemConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EdgeMemConfig::default(),
    };
    if let Some(root) = cli.root {
        config.storage.root = root;
    }
    if cli.encryption_key.is_some() {
        config.storage.encryption_key = cli.encryption_key;
    }

    match cli.command {
        Commands::Store { json, plain } => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("argument is not valid JSON")?;
            let store = open_store(&config).await?;
            let manifest = store.store_local(&value, !plain).await?;
            print_json(&manifest)?;
        }
        Commands::Get { id } => {
            let store = open_store(&config).await?;
            let value = store.load_record(&id).await?;
            print_json(&value)?;
        }
        Commands::Retrieve { query, exact } => {
            let store = open_store(&config).await?;
            let result = store.retrieve_local(&query, !exact).await;
            if !result.failures.is_empty() {
                tracing::warn!(
                    failures = result.failures.len(),
                    "Some records could not be decoded"
                );
            }
            print_json(&result)?;
        }
        Commands::Cleanup { older_than_secs } => {
            let store = open_store(&config).await?;
            let report = store.cleanup(older_than_secs.saturating_mul(1000)).await?;
            print_json(&report)?;
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            let stats = store.get_storage_stats().await?;
            print_json(&stats)?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn open_store(config: &EdgeMemConfig) -> Result<EdgeStore> {
    tracing::debug!(root = %config.storage.root.display(), "Opening edge store");
    EdgeStore::new(config.storage.clone())
        .await
        .context("failed to open edge store")
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show_config(config: Option<&EdgeMemConfig>) -> Result<()> {
    let mut config = config.cloned().unwrap_or_default();
    if config.storage.encryption_key.is_some() {
        config.storage.encryption_key = Some("<redacted>".to_string());
    }
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
