//! urlscope main entry point
//!
//! This is the command-line interface for the urlscope feature extractor.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use urlscope::config::{load_config_with_hash, Config};
use urlscope::features::build_feature_sets;
use urlscope::output::{export_jsonl, load_statistics, print_schema, print_statistics};
use urlscope::pipeline::LABEL_FIELD;
use urlscope::source::SourceLoader;
use urlscope::storage::{open_storage, FeatureStore, RunStatus, SqliteStorage, StoreQuery};
use urlscope::{Pipeline, UrlLabel};

/// urlscope: URL feature extraction for classification
///
/// urlscope reads labeled URLs, resolves each one once, computes lexical,
/// content, header and host features, and stores one flat row per URL.
/// URLs already in the database are skipped.
#[derive(Parser, Debug)]
#[command(name = "urlscope")]
#[command(version)]
#[command(about = "URL canonicalization and feature extraction", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the declared feature schema without processing
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Export stored rows as JSON lines to the configured export path and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,

    /// Only export rows with this label
    #[arg(long, value_name = "LABEL", requires = "export")]
    label: Option<UrlLabel>,

    /// Process at most this many input records
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config, cli.label)?;
    } else {
        handle_run(config, &config_hash, cli.limit).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("urlscope=info,warn"),
            1 => EnvFilter::new("urlscope=debug,info"),
            2 => EnvFilter::new("urlscope=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = &config.output.database_path;
    open_storage(Path::new(path)).with_context(|| format!("Failed to open database {}", path))
}

/// Handles the --dry-run mode: validates config and shows the schema
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== urlscope Dry Run ===\n");

    println!("Source:");
    println!("  Location: {}", config.source.location);
    println!("  Timeout: {}s", config.source.timeout_secs);

    println!("\nResolver:");
    println!("  Probe timeout: {}s", config.resolver.probe_timeout_secs);
    println!("  Max redirects: {}", config.resolver.max_redirects);
    println!("  User agent: {}", config.resolver.user_agent);
    println!("  Max body: {} bytes", config.resolver.max_body_bytes);

    println!("\nHost Lookups:");
    println!(
        "  Intel: {} ({})",
        config.intel.endpoint,
        if config.intel.api_key.is_some() {
            "key configured"
        } else {
            "no key, skipped"
        }
    );
    println!(
        "  Archive: {} ({})",
        config.archive.endpoint,
        if config.archive.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    println!("\nPipeline:");
    println!("  Workers: {}", config.pipeline.workers);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Export: {}", config.output.export_path);
    println!();

    let feature_sets = build_feature_sets(config)?;
    urlscope::pipeline::ensure_disjoint(&feature_sets)?;
    print_schema(&feature_sets);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored rows as JSON lines
fn handle_export(config: &Config, label: Option<UrlLabel>) -> anyhow::Result<()> {
    println!("=== Exporting Feature Rows ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.export_path);
    println!();

    let storage = open_database(config)?;
    let query = match label {
        Some(label) => StoreQuery::new().field(LABEL_FIELD, label.as_str()),
        None => StoreQuery::new(),
    };

    let written = export_jsonl(&storage, &query, Path::new(&config.output.export_path))
        .with_context(|| format!("Failed to export to {}", config.output.export_path))?;

    println!("✓ {} rows exported to: {}", written, config.output.export_path);

    Ok(())
}

/// Handles the main extraction run
async fn handle_run(config: Config, config_hash: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let mut storage = open_database(&config)?;
    let run_id = storage.create_run(config_hash)?;
    let store = Arc::new(Mutex::new(storage));

    let result = run_pipeline(&config, store.clone(), run_id, limit).await;

    let mut storage = store
        .lock()
        .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?;
    match result {
        Ok(()) => {
            storage.complete_run(run_id)?;
            tracing::info!("Run {} completed successfully", run_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run {} failed: {:#}", run_id, e);
            storage.update_run_status(run_id, RunStatus::Failed)?;
            Err(e)
        }
    }
}

async fn run_pipeline(
    config: &Config,
    store: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config, store)?.with_run_id(run_id);

    let loader = SourceLoader::new(&config.source);
    tracing::info!("Loading URLs from {}", loader.location());
    let (mut records, malformed) = loader
        .load()
        .await
        .with_context(|| format!("Failed to load source {}", loader.location()))?;
    if malformed > 0 {
        tracing::warn!("Skipped {} malformed source lines", malformed);
    }
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    tracing::info!(
        "Starting run {} over {} URLs with {} worker(s)",
        run_id,
        records.len(),
        config.pipeline.workers
    );
    let stats = pipeline.run(records).await?;

    println!("\n=== Run {} Summary ===", run_id);
    println!("  Processed: {}", stats.processed);
    println!("  Inserted: {}", stats.inserted);
    println!("  Skipped (seen before): {}", stats.skipped);
    println!("  Feature set failures: {}", stats.failed_sets);
    println!("  Malformed input lines: {}", malformed);

    Ok(())
}
