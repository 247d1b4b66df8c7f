//! Buddy Match - ranks travel buddies against a traveller's request.
//!
//! This library provides the core functionality for the buddy matching system:
//! a traveller describes where they are going and what they care about, and the
//! system returns the best-fitting buddy profiles.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Profile, BuddyRequest, ScoredBuddy, etc.)
//! - **text**: Normalization shared by every comparison
//! - **config**: Weights, eligibility policy and file locations (TOML)
//! - **scoring**: The weighted relevance rule
//! - **storage**: Profile persistence (in-memory and SQLite)
//! - **provider**: Profile sheets (CSV, flat or one-hot)
//! - **ingestion**: Loading sheets into storage with deduplication
//! - **query**: Match execution and top-k ranking
//! - **metrics** / **batch**: Offline evaluation of a request over a batch
//! - **server**: HTTP API
//! - **harness**: Acceptance scenarios replayed against the API
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load profiles from a CSV sheet
//! 2. Deduplicate by normalized name and destination
//! 3. Store profiles in a SQLite database
//!
//! ## Online Matching
//!
//! 1. Receive a booking request over HTTP
//! 2. Score every stored profile against the supplied criteria
//! 3. Drop ineligible candidates under the configured policy
//! 4. Return the top-k ranked buddies, or 404 when none qualify
//!
//! # Example
//!
//! ```ignore
//! use buddy_match::{
//!     config::MatchConfig,
//!     provider::csv::CsvProfileProvider,
//!     query::{BruteForceMatchEngine, MatchEngine, MatchQuery},
//!     storage::memory::MemoryStorage,
//!     BuddyRequest, ProfileProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Set up components
//!     let provider = CsvProfileProvider::from_file("data/buddies.csv").await?;
//!     let storage = MemoryStorage::from_profiles(provider.fetch_profiles().await?);
//!     let engine = BruteForceMatchEngine::new(storage, MatchConfig::default());
//!
//!     // Execute match
//!     let request = BuddyRequest {
//!         destination: Some("Los Angeles".to_string()),
//!         language: Some("English,Spanish".to_string()),
//!         ..BuddyRequest::default()
//!     };
//!     let results = engine.find_best_buddies(&MatchQuery::new(request, None)).await?;
//!
//!     for result in results {
//!         println!("{}: {}", result.profile.name, result.score);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod batch;
pub mod config;
pub mod harness;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod query;
pub mod scoring;
pub mod server;
pub mod storage;
pub mod text;

// Re-export commonly used types at the crate root
pub use config::{AppConfig, MatchConfig, MatchPolicy};
pub use models::{BuddyRequest, Criterion, MatchStrength, Profile, ScoredBuddy};
pub use provider::ProfileProvider;
pub use query::{MatchEngine, MatchQuery};
pub use scoring::{Scorer, WeightedScorer};
pub use storage::ProfileStorage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
