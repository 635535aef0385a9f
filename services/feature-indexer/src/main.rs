//! Feature indexer service.
//!
//! Builds (or reuses) the persisted spatial index of a profile-archive
//! dataset and answers nearest-in-time queries against it, printing JSON
//! to stdout.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use commands::{BuildArgs, QueryArgs};
use feature_index::{IndexConfig, PointDatasetFactory, ProfileArchiveReader};

#[derive(Parser, Debug)]
#[command(name = "feature-indexer")]
#[command(about = "Spatio-temporal index builder and query tool for point observations")]
struct Args {
    /// Directory where persisted indexes are kept
    #[arg(long, global = true, env = "FEATURE_INDEX_DIR")]
    working_dir: Option<PathBuf>,

    /// Maximum number of open dataset files
    #[arg(long, global = true, env = "FEATURE_HANDLE_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or refresh the index of a dataset and print its extents
    Build(BuildArgs),
    /// Print the features nearest in time to a target, one per platform
    Query(QueryArgs),
}

/// Filter from `RUST_LOG`, falling back to the `--log-level` value.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the JSON result
    let builder = fmt()
        .with_env_filter(log_filter(&args.log_level))
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let mut config = IndexConfig::from_env();
    if let Some(dir) = args.working_dir {
        config.working_dir = dir;
    }
    if let Some(size) = args.cache_size {
        config.handle_cache_size = size;
    }
    info!(
        working_dir = %config.working_dir.display(),
        cache_size = config.handle_cache_size,
        "Loaded configuration"
    );

    let factory = PointDatasetFactory::new(config, ProfileArchiveReader::new())?;

    let output = match &args.command {
        Command::Build(build) => commands::build(&factory, build)?,
        Command::Query(query) => commands::query(&factory, query)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    let stats = factory.cache_stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        hit_rate = format!("{:.1}%", stats.hit_rate()),
        "Handle cache statistics"
    );

    Ok(())
}
