//! # Curate CLI (`curate`)
//!
//! ## Usage
//!
//! ```bash
//! curate --config ./config/curate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curate init [--recreate]` | Create the SQLite database and schema |
//! | `curate run --start <ts> --end <ts>` | Process one partition `[start, end)` |
//! | `curate hourly --hour <YYYY-MM-DDTHH>` | Process one hourly partition |
//! | `curate stats` | Document and attribute counts |
//! | `curate get <id>` | A document and its attributes |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); reports go to stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use curate::config::{self, Config, Topic};
use curate::models::Partition;
use curate::pipeline::PipelineDriver;
use curate::store::SqliteStore;
use curate::{db, get, migrate, stats};

/// Curate: classify and summarize link aggregator stories per time window.
#[derive(Parser)]
#[command(
    name = "curate",
    about = "Partitioned LLM enrichment pipeline for Hacker News stories",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/curate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent unless `--recreate` is given.
    Init {
        /// Drop all tables first, including the LLM response cache.
        #[arg(long)]
        recreate: bool,
    },

    /// Process one partition.
    ///
    /// Collects every story posted in `[start, end)`, classifies it for the
    /// configured topics, and replaces the partition's stored results.
    Run {
        /// Partition start (RFC 3339), inclusive.
        #[arg(long, value_parser = parse_rfc3339)]
        start: DateTime<Utc>,

        /// Partition end (RFC 3339), exclusive.
        #[arg(long, value_parser = parse_rfc3339)]
        end: DateTime<Utc>,

        /// Restrict to these topics (repeatable). Defaults to all.
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Process the hourly partition starting at `--hour`.
    Hourly {
        /// Hour in UTC, e.g. `2024-06-01T13`.
        #[arg(long, value_parser = parse_hour)]
        hour: DateTime<Utc>,

        #[arg(long = "topic")]
        topics: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats,

    /// Retrieve a document and its attributes.
    Get {
        /// Document id.
        id: i64,

        #[arg(long)]
        json: bool,
    },
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn parse_hour(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(&format!("{}:00:00", s), "%Y-%m-%dT%H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| format!("invalid hour '{}' (expected YYYY-MM-DDTHH): {}", s, e))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,reqwest=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Topics to run, in config order.
fn select_topics(config: &Config, config_path: &Path, names: &[String]) -> Result<Vec<Topic>> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let all = config.resolve_topics(base_dir)?;
    if names.is_empty() {
        return Ok(all);
    }

    for name in names {
        if !all.iter().any(|t| &t.name == name) {
            bail!("unknown topic: '{}'", name);
        }
    }
    Ok(all.into_iter().filter(|t| names.contains(&t.name)).collect())
}

async fn run_partition(
    config: &Config,
    config_path: &Path,
    partition: Partition,
    topic_names: &[String],
    json: bool,
) -> Result<()> {
    let topics = select_topics(config, config_path, topic_names)?;
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool, false).await?;

    let driver = PipelineDriver::from_config(config, SqliteStore::new(pool.clone()))?;
    let result = driver.run(&partition, &topics).await;
    pool.close().await;

    match result {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage, "{:#}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { recreate } => {
            migrate::run_migrations(&cfg, recreate).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            start,
            end,
            topics,
            json,
        } => {
            let partition = Partition::from_datetimes(start, end)?;
            run_partition(&cfg, &cli.config, partition, &topics, json).await?;
        }
        Commands::Hourly { hour, topics, json } => {
            let partition = Partition::hourly(hour).context("invalid hourly partition")?;
            run_partition(&cfg, &cli.config, partition, &topics, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, id, json).await?;
        }
    }

    Ok(())
}
