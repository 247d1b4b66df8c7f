//! Ingestion pipeline binary entry point.
//!
//! This binary loads a CSV profile sheet into the SQLite database used by the
//! server and the search binary.
//!
//! # Examples
//!
//! Initialize new database:
//! ```bash
//! ingestion --mode init-new --input data/buddies.csv --db-path buddies.db
//! ```
//!
//! Add profiles to existing database:
//! ```bash
//! ingestion --input new_buddies.csv
//! ```

use anyhow::{Context, Result};
use buddy_match::{
    config::AppConfig,
    ingestion::IngestionPipeline,
    provider::{csv::CsvProfileProvider, ProfileProvider},
    storage::sqlite::SqliteStorage,
};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the ingestion pipeline
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to existing database (default)
    Connect,
    /// Initialize new database with fresh schema
    InitNew,
}

/// Ingestion pipeline CLI for building and updating the buddy database
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build and update the buddy profile database",
    long_about = "Ingestion pipeline that reads buddy profile sheets, removes duplicates and stores the profiles in SQLite.

EXAMPLES:
  Initialize new database:
    ingestion --mode init-new --input data/buddies.csv --db-path buddies.db

  Add profiles to existing database:
    ingestion --input new_buddies.csv

  Custom batch size and logging:
    ingestion --input buddies.csv --batch-size 50 --log-level debug"
)]
struct IngestionArgs {
    /// Input CSV sheet (flat or one-hot layout)
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Database file path (defaults to the configured database)
    #[arg(long, value_name = "PATH")]
    db_path: Option<String>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Operation mode: connect to existing DB or initialize new DB
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Number of profiles stored per progress step
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Ensure the database directory exists
fn prepare_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = PathBuf::from(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }
    Ok(())
}

/// Create and initialize the ingestion pipeline based on mode
async fn create_pipeline(
    args: &IngestionArgs,
    db_path: &str,
) -> Result<IngestionPipeline<SqliteStorage>> {
    let batch_size = Some(args.batch_size);

    let pipeline = match args.mode {
        Mode::Connect => {
            info!("Connecting to existing database");
            let storage = SqliteStorage::open(db_path)
                .context("Failed to open database")?;
            IngestionPipeline::connect(storage, batch_size)
                .await
                .context("Failed to connect to existing database. Use --mode init-new to create a new database.")?
        }
        Mode::InitNew => {
            info!("Initializing new database");
            let storage = SqliteStorage::new(db_path.to_string());
            IngestionPipeline::initialize_new(storage, batch_size)
                .await
                .context("Failed to initialize new database")?
        }
    };

    debug!("Pipeline created with batch_size={}", pipeline.batch_size());
    Ok(pipeline)
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} profiles | Inserted: {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = IngestionArgs::parse();

    // Initialize logging
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting buddy ingestion pipeline");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    // Validate input file exists
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }
    info!("Input file: {:?}", args.input);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| config.data.db_path.to_string_lossy().to_string());

    prepare_db_dir(&db_path)?;
    info!("Database path: {}", db_path);

    let mut pipeline = create_pipeline(&args, &db_path)
        .await
        .context("Failed to create ingestion pipeline")?;

    // Load profile sheet
    let provider = CsvProfileProvider::from_file(args.input.clone())
        .await
        .with_context(|| format!("Failed to load profiles from {:?}", args.input))?;
    let profiles = provider.fetch_profiles().await?;
    info!("Found {} profiles in {}", profiles.len(), provider.name());

    if profiles.is_empty() {
        warn!("No profiles found in input file");
        return Ok(());
    }

    let progress = create_progress_bar(profiles.len())?;
    progress.set_message("0");

    // The bar advances once per stored chunk of --batch-size profiles
    let stats = pipeline
        .ingest_with_progress(&profiles, |running, chunk_len| {
            progress.inc(chunk_len as u64);
            progress.set_message(format!("{}", running.inserted));
        })
        .await
        .context("Failed to ingest profiles")?;

    progress.finish_with_message(format!("{}", stats.inserted));

    // Display final statistics
    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!(
            "{} profiles failed to store - check logs for details",
            stats.failed
        );
    }

    info!("Ingestion pipeline completed successfully");

    Ok(())
}
