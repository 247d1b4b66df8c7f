//! HTTP server binary entry point.
//!
//! Serves `POST /api/book_buddy` and `GET /api/health` over profiles loaded from
//! a CSV sheet or a SQLite database.
//!
//! # Examples
//!
//! Serve the bundled sheet on the default port:
//! ```bash
//! buddy-server --profiles data/buddies.csv
//! ```
//!
//! Serve a database with a config file:
//! ```bash
//! BUDDY_PORT=9000 buddy-server --db-path buddies.db --config buddy.toml
//! ```

use anyhow::{Context, Result};
use buddy_match::{
    config::AppConfig,
    provider::{csv::CsvProfileProvider, ProfileProvider},
    query::{BruteForceMatchEngine, MatchEngine},
    server::BuddyServer,
    storage::{memory::MemoryStorage, sqlite::SqliteStorage},
    MatchPolicy,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Buddy matching HTTP API
#[derive(Parser, Debug)]
#[command(name = "buddy-server", version, about = "Serve the buddy matching API")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", env = "BUDDY_CONFIG")]
    config: Option<PathBuf>,

    /// CSV profile sheet (defaults to the configured sheet)
    #[arg(long, value_name = "FILE", conflicts_with = "db_path")]
    profiles: Option<PathBuf>,

    /// SQLite database built by the ingestion binary
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Bind address (overrides the configuration)
    #[arg(long, env = "BUDDY_HOST")]
    host: Option<String>,

    /// Port (overrides the configuration)
    #[arg(long, env = "BUDDY_PORT")]
    port: Option<u16>,

    /// Eligibility policy (overrides the configuration)
    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Build the engine over the selected profile source
async fn create_engine(args: &Args, config: &AppConfig) -> Result<Arc<dyn MatchEngine>> {
    let mut matching = config.matching.clone();
    if let Some(policy) = args.policy {
        matching.policy = policy;
    }
    info!(
        "Matching policy {:?}, top {} results",
        matching.policy, matching.top_k
    );

    if let Some(db_path) = &args.db_path {
        if !db_path.exists() {
            anyhow::bail!(
                "Database file not found: {}\n\
                 Please run the ingestion binary first to create the database.",
                db_path.display()
            );
        }
        let storage = SqliteStorage::open(db_path.to_string_lossy().to_string())
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        return Ok(Arc::new(BruteForceMatchEngine::new(storage, matching)));
    }

    let sheet = args
        .profiles
        .clone()
        .unwrap_or_else(|| config.data.profiles_path.clone());
    let provider = CsvProfileProvider::from_file(sheet.clone())
        .await
        .with_context(|| format!("Failed to load profiles from {}", sheet.display()))?;
    let profiles = provider.fetch_profiles().await?;
    Ok(Arc::new(BruteForceMatchEngine::new(
        MemoryStorage::from_profiles(profiles),
        matching,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let mut server_config = config.server.clone();
    if let Some(host) = &args.host {
        server_config.host = host.clone();
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let engine = create_engine(&args, &config).await?;
    let profile_count = engine
        .candidate_count()
        .await
        .context("Failed to count profiles")?;
    info!("Serving {} profiles", profile_count);

    BuddyServer::new(server_config, engine)
        .run()
        .await
        .context("Server failed")?;

    Ok(())
}
