//! Search binary entry point.
//!
//! This binary runs a single buddy request from the command line against a CSV
//! sheet or a pre-built database, with table or JSON output.
//!
//! # Examples
//!
//! Match against the bundled sheet:
//! ```bash
//! buddy-search --profiles data/buddies.csv --destination "Los Angeles" --language English,Spanish
//! ```
//!
//! JSON output from a database, ranked policy:
//! ```bash
//! buddy-search --db-path buddies.db --destination Paris --policy ranked --format json
//! ```

use anyhow::{Context, Result};
use buddy_match::{
    config::AppConfig,
    models::{BuddyRequest, MatchStrength, ScoredBuddy},
    provider::{csv::CsvProfileProvider, ProfileProvider},
    query::{BruteForceMatchEngine, MatchEngine, MatchQuery, QueryError},
    storage::{memory::MemoryStorage, sqlite::SqliteStorage},
    MatchPolicy,
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for match results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored match strength
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search binary CLI for querying buddy profiles
#[derive(Parser, Debug)]
#[command(
    name = "buddy-search",
    version,
    about = "Find the best travel buddies for a request",
    long_about = "Score every buddy profile against the given criteria and print the top matches.

EXAMPLES:
  From the CSV sheet:
    buddy-search --profiles data/buddies.csv --destination \"Los Angeles\" --keywords shopping,food

  From a database, JSON output:
    buddy-search --db-path buddies.db --destination Paris --format json

  Partial matches allowed, top 10:
    buddy-search --destination Rome --language Italian --policy ranked --top-k 10"
)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// CSV profile sheet (defaults to the configured sheet)
    #[arg(long, value_name = "FILE", conflicts_with = "db_path")]
    profiles: Option<PathBuf>,

    /// SQLite database built by the ingestion binary
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    #[arg(long)]
    destination: Option<String>,

    /// Comma-separated languages you speak
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    local_language: Option<String>,

    /// Comma-separated interests
    #[arg(long)]
    keywords: Option<String>,

    #[arg(long)]
    event: Option<String>,

    #[arg(long)]
    package: Option<String>,

    /// Number of results to return (overrides the configuration)
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Eligibility policy (overrides the configuration)
    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Print the per-criterion breakdown of every result
    #[arg(long)]
    explain: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

impl Args {
    fn request(&self) -> BuddyRequest {
        BuddyRequest {
            destination: self.destination.clone(),
            language: self.language.clone(),
            local_language: self.local_language.clone(),
            keywords: self.keywords.clone(),
            event: self.event.clone(),
            package: self.package.clone(),
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

/// Format results as a pretty table
fn format_results_table(results: &[ScoredBuddy]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Destination").add_attribute(Attribute::Bold),
        Cell::new("Languages").add_attribute(Attribute::Bold),
        Cell::new("Event").add_attribute(Attribute::Bold),
        Cell::new("Package").add_attribute(Attribute::Bold),
        Cell::new("Match").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let profile = &result.profile;
        let (strength_str, color) = match result.strength {
            MatchStrength::Perfect => ("PERFECT", Color::Green),
            MatchStrength::Strong => ("STRONG", Color::Cyan),
            MatchStrength::Partial => ("PARTIAL", Color::Yellow),
            MatchStrength::Weak => ("WEAK", Color::White),
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&profile.name),
            Cell::new(profile.destination.as_deref().unwrap_or("-")),
            Cell::new(profile.language.as_deref().unwrap_or("-")),
            Cell::new(profile.event.as_deref().unwrap_or("-")),
            Cell::new(profile.package.as_deref().unwrap_or("-")),
            Cell::new(strength_str).fg(color),
            Cell::new(result.score),
        ]);
    }

    table.to_string()
}

/// Display the scoring breakdown of a single result
fn display_result_detail(result: &ScoredBuddy, rank: usize) {
    println!("\n{}", "═".repeat(60));
    println!("Rank: {}  {}  (score {})", rank, result.profile.name, result.score);
    for matched in &result.breakdown.matched {
        println!("  + {:<15} {:>4}", matched.criterion.column(), matched.points);
    }
    for missed in &result.breakdown.missed {
        println!("  - {:<15} {:>4}", missed.column(), 0);
    }
    println!("Keywords: {}", result.profile.keywords.as_deref().unwrap_or("-"));
}

/// Build the engine over the selected profile source
async fn create_engine(args: &Args, config: &AppConfig) -> Result<Box<dyn MatchEngine>> {
    let mut matching = config.matching.clone();
    if let Some(policy) = args.policy {
        matching.policy = policy;
    }

    if let Some(db_path) = &args.db_path {
        if !db_path.exists() {
            anyhow::bail!(
                "Database file not found: {}\n\
                 Please run the ingestion binary first to create the database.",
                db_path.display()
            );
        }
        info!("Loading database from: {}", db_path.display());
        let storage = SqliteStorage::open(db_path.to_string_lossy().to_string())
            .with_context(|| "Failed to open database")?;
        return Ok(Box::new(BruteForceMatchEngine::new(storage, matching)));
    }

    let sheet = args
        .profiles
        .clone()
        .unwrap_or_else(|| config.data.profiles_path.clone());
    let provider = CsvProfileProvider::from_file(sheet.clone())
        .await
        .with_context(|| format!("Failed to load profiles from {}", sheet.display()))?;
    let profiles = provider.fetch_profiles().await?;
    Ok(Box::new(BruteForceMatchEngine::new(
        MemoryStorage::from_profiles(profiles),
        matching,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let request = args.request();
    if request.supplied_criteria().is_empty() {
        anyhow::bail!(
            "At least one criterion (--destination, --language, --keywords, ...) must be given.\n\
             Use --help for usage information."
        );
    }

    let engine = create_engine(&args, &config).await?;
    info!("Searching {} profiles", engine.candidate_count().await?);

    let start = Instant::now();
    let query = MatchQuery::new(request, args.top_k);
    let results = match engine.find_best_buddies(&query).await {
        Ok(results) => results,
        Err(QueryError::NoMatches(_)) => {
            println!("No matching buddies found.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to execute match"),
    };
    let elapsed = start.elapsed();

    match args.format {
        OutputFormat::Table => {
            println!("{}", format_results_table(&results));
            println!(
                "\nFound {} buddies in {:.2}ms",
                results.len(),
                elapsed.as_secs_f64() * 1000.0
            );
            if args.explain {
                for (idx, result) in results.iter().enumerate() {
                    display_result_detail(result, idx + 1);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&results)
                .with_context(|| "Failed to serialize results to JSON")?;
            println!("{}", json);
        }
    }

    Ok(())
}
