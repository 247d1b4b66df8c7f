//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting and retrieving buddy profiles.
//! The abstraction lets the match engine run over an in-memory sheet or a SQLite
//! database with the same API.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Profile;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate entry (same name and destination already stored)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for profile storage backends.
///
/// Profiles must be returned in a stable order (insertion order or ascending id):
/// the ranker breaks score ties by that order.
#[async_trait]
pub trait ProfileStorage: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// This should be idempotent and safe to call multiple times.
    ///
    /// # Errors
    /// Returns `StorageError` if initialization fails
    async fn initialize(&mut self) -> StorageResult<()>;

    /// Insert a new profile into storage.
    ///
    /// # Arguments
    /// * `profile` - The profile to insert (id will be assigned by the storage)
    ///
    /// # Returns
    /// The assigned profile ID
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if a profile with the same
    /// match key already exists
    async fn insert_profile(&mut self, profile: &Profile) -> StorageResult<i64>;

    /// Check if a profile with the given match key exists.
    ///
    /// This is used for deduplication during ingestion. See [`Profile::match_key`].
    async fn exists_by_key(&self, match_key: &str) -> StorageResult<bool>;

    /// Retrieve every stored profile, in storage order.
    async fn get_all_profiles(&self) -> StorageResult<Vec<Profile>>;

    /// Get a profile by its ID.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the profile doesn't exist
    async fn get_profile_by_id(&self, id: i64) -> StorageResult<Profile>;

    /// Get the total count of stored profiles.
    async fn count_profiles(&self) -> StorageResult<usize>;
}
