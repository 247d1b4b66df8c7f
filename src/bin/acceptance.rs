//! Acceptance binary entry point.
//!
//! Replays a scenario suite against a running buddy server and prints a
//! pass/fail table. Exits non-zero when any scenario fails.
//!
//! # Examples
//!
//! ```bash
//! acceptance --base-url http://127.0.0.1:8000
//! acceptance --suite my_scenarios.json --format json
//! ```

use anyhow::{Context, Result};
use buddy_match::harness::{AcceptanceRunner, ScenarioSuite, SuiteReport};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Acceptance scenarios for the booking API
#[derive(Parser, Debug)]
#[command(name = "acceptance", version, about = "Replay acceptance scenarios against a buddy server")]
struct Args {
    /// Root URL of the server under test
    #[arg(long, env = "BUDDY_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    /// Scenario suite (JSON); the bundled suite when omitted
    #[arg(long, value_name = "FILE")]
    suite: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value = "10")]
    timeout: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
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

fn format_report_table(report: &SuiteReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Scenario").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Result").add_attribute(Attribute::Bold),
    ]);

    for outcome in &report.outcomes {
        let status = outcome
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let result = match &outcome.failure {
            None => Cell::new("PASS").fg(Color::Green),
            Some(reason) => Cell::new(format!("FAIL: {}", reason)).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(outcome.id),
            Cell::new(&outcome.title),
            Cell::new(status),
            result,
        ]);
    }

    table.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    let suite = match &args.suite {
        Some(path) => ScenarioSuite::from_file(path)
            .with_context(|| format!("Failed to load scenarios from {}", path.display()))?,
        None => ScenarioSuite::builtin().context("Bundled scenario suite is invalid")?,
    };

    let runner = AcceptanceRunner::new(&args.base_url, Some(Duration::from_secs(args.timeout)))
        .context("Failed to create HTTP client")?;
    info!("Replaying {} scenarios against {}", suite.len(), runner.endpoint());

    let report = runner.run_suite(&suite).await;

    match args.format {
        OutputFormat::Table => {
            println!("{}", format_report_table(&report));
            println!(
                "\n{} passed, {} failed",
                report.passed(),
                report.failed()
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize report to JSON")?;
            println!("{}", json);
        }
    }

    if !report.all_passed() {
        anyhow::bail!("{} of {} scenarios failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}
