//! Batch evaluation binary entry point.
//!
//! Splits a profile sheet 80/20 with a fixed seed, runs one request against both
//! halves, exports the top matches of each to CSV and logs classification
//! metrics against placeholder labels.
//!
//! # Examples
//!
//! ```bash
//! batch-eval --profiles data/buddies.csv
//! batch-eval --profiles training.csv --destination Rome --keywords history --policy strict
//! ```

use anyhow::{Context, Result};
use buddy_match::{
    batch::{BatchProcessor, BatchReport},
    config::AppConfig,
    metrics::{synthetic_ground_truth, train_test_split},
    models::BuddyRequest,
    provider::{csv::CsvProfileProvider, ProfileProvider},
    MatchPolicy,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Offline batch evaluation of the matching rule
#[derive(Parser, Debug)]
#[command(name = "batch-eval", version, about = "Evaluate a request over train/test batches")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// CSV profile sheet (flat or one-hot; defaults to the configured sheet)
    #[arg(long, value_name = "FILE")]
    profiles: Option<PathBuf>,

    #[arg(long, default_value = "Paris")]
    destination: String,

    #[arg(long, default_value = "English")]
    language: String,

    #[arg(long, default_value = "French")]
    local_language: String,

    #[arg(long, default_value = "food,history")]
    keywords: String,

    #[arg(long, default_value = "Art Exhibit")]
    event: String,

    #[arg(long, default_value = "Shopping Enthusiast")]
    package: String,

    /// Fraction of the sheet held out as the test batch
    #[arg(long, default_value = "0.2")]
    test_fraction: f64,

    /// Shuffle seed of the split
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Eligibility policy; batch evaluation ranks partial matches by default
    #[arg(long, value_enum, default_value = "ranked")]
    policy: MatchPolicy,

    /// CSV file receiving the top matches (overrides the configuration)
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn request(&self) -> BuddyRequest {
        BuddyRequest {
            destination: Some(self.destination.clone()),
            language: Some(self.language.clone()),
            local_language: Some(self.local_language.clone()),
            keywords: Some(self.keywords.clone()),
            event: Some(self.event.clone()),
            package: Some(self.package.clone()),
        }
    }
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Export path for one batch: `top.csv` becomes `top_train.csv`.
fn batch_export_path(base: &Path, label: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "top_matching_buddies".to_string());
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "csv".to_string());
    base.with_file_name(format!("{}_{}.{}", stem, label, extension))
}

fn print_summary(report: &BatchReport) {
    println!(
        "{:<6} {:>4} candidates, {} selected",
        report.label,
        report.candidates,
        report.top.len()
    );
    if let Some(metrics) = &report.metrics {
        println!(
            "       accuracy {:.2}  precision {:.2}  recall {:.2}  f1 {:.2}",
            metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
        );
    }
    match (&report.exported_to, &report.export_error) {
        (Some(path), _) => println!("       exported to {}", path.display()),
        (None, Some(reason)) => println!("       export failed: {}", reason),
        (None, None) => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let sheet = args
        .profiles
        .clone()
        .unwrap_or_else(|| config.data.profiles_path.clone());

    let provider = CsvProfileProvider::from_file(sheet.clone())
        .await
        .with_context(|| format!("Failed to load profiles from {}", sheet.display()))?;
    let profiles = provider.fetch_profiles().await?;
    info!("Loaded {} profiles from {}", profiles.len(), sheet.display());

    let (train, test) = train_test_split(profiles, args.test_fraction, args.seed)
        .context("Failed to split profiles")?;
    info!("Split into {} training and {} test profiles", train.len(), test.len());

    let export_base = args
        .export
        .clone()
        .unwrap_or_else(|| config.data.export_path.clone());
    let matching = config.matching.clone().with_policy(args.policy);
    let request = args.request();

    for (label, batch) in [("train", &train), ("test", &test)] {
        info!("Processing {} set:", label);
        let processor = BatchProcessor::new(
            matching.clone(),
            Some(batch_export_path(&export_base, label)),
        );
        let truth = synthetic_ground_truth(batch.len());
        let report = processor
            .process_batch(label, batch, &request, Some(truth.as_slice()))
            .with_context(|| format!("Failed to process {} batch", label))?;
        print_summary(&report);
    }

    Ok(())
}
