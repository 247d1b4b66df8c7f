//! Profile provider module.
//!
//! This module defines the interface for sourcing buddy profiles from tabular
//! sheets and other data sources.
//!
//! The `ProfileProvider` trait abstracts the source of profile data, allowing the
//! ingestion pipeline and the batch tools to work with different backends without
//! coupling to a specific file format.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Profile;

pub mod csv;

/// Errors that can occur when fetching profiles from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The sheet has no usable columns
    #[error("Unsupported sheet layout: {0}")]
    LayoutError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing buddy profiles.
///
/// Providers return profiles without ids (ids are assigned by storage) and are not
/// responsible for deduplication (that is handled by the ingestion pipeline).
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Fetch all available profiles from this provider.
    ///
    /// # Errors
    /// Returns `ProviderError` if profiles cannot be fetched or parsed
    async fn fetch_profiles(&self) -> ProviderResult<Vec<Profile>>;

    /// Fetch a specific number of profiles, useful for testing or incremental ingestion.
    ///
    /// # Returns
    /// A vector of profiles (may be fewer than `limit` if not enough are available)
    async fn fetch_profiles_limit(&self, limit: usize) -> ProviderResult<Vec<Profile>> {
        let all = self.fetch_profiles().await?;
        Ok(all.into_iter().take(limit).collect())
    }

    /// Get the total count of profiles available from this provider.
    async fn count_profiles(&self) -> ProviderResult<usize> {
        self.fetch_profiles().await.map(|profiles| profiles.len())
    }

    /// Get a human-readable name/description of this provider.
    ///
    /// This is useful for logging and debugging.
    fn name(&self) -> &str;
}
