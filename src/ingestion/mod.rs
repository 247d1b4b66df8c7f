//! Ingestion pipeline module.
//!
//! This module loads buddy profiles from a provider, deduplicates them and
//! persists them to storage.
//!
//! # Usage Patterns
//!
//! ## Primary: Adding Profiles to Existing Storage
//! The typical workflow is to connect to a database that already holds profiles:
//!
//! ```ignore
//! use buddy_match::ingestion::IngestionPipeline;
//! use buddy_match::provider::csv::CsvProfileProvider;
//! use buddy_match::storage::sqlite::SqliteStorage;
//!
//! let storage = SqliteStorage::open("buddies.db")?;
//! let mut pipeline = IngestionPipeline::connect(storage, None).await?;
//!
//! let provider = CsvProfileProvider::from_file("new_buddies.csv").await?;
//! let stats = pipeline.ingest_from_provider(&provider).await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! ## Secondary: Creating New Storage
//! When setting up a new database for the first time:
//!
//! ```ignore
//! let storage = SqliteStorage::new("buddies.db".to_string());
//! let mut pipeline = IngestionPipeline::initialize_new(storage, None).await?;
//! ```
//!
//! Two profiles are the same buddy when their normalized name and destination
//! agree (see [`Profile::match_key`]).

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Profile;
use crate::provider::{ProfileProvider, ProviderError};
use crate::storage::{ProfileStorage, StorageError};

/// Default number of profiles handled per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Provider failed to fetch profiles
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate profile detected
    #[error("Duplicate profile: {0}")]
    Duplicate(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of input profiles processed
    pub total_processed: usize,

    /// Number of profiles successfully inserted
    pub inserted: usize,

    /// Number of profiles skipped due to deduplication
    pub duplicates_skipped: usize,

    /// Number of profiles that failed to insert
    pub failed: usize,
}

impl IngestionStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    /// Fold the counts of another run into this one.
    pub fn merge(&mut self, other: &IngestionStats) {
        self.total_processed += other.total_processed;
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failed += other.failed;
    }
}

/// Ingestion pipeline coordinator.
///
/// Owns the storage backend for the duration of the run and reports what
/// happened to every input profile through [`IngestionStats`].
pub struct IngestionPipeline<S>
where
    S: ProfileStorage,
{
    /// Storage backend for persisting profiles
    storage: S,

    /// Number of profiles handled per chunk
    batch_size: usize,
}

impl<S> IngestionPipeline<S>
where
    S: ProfileStorage,
{
    /// Connect to an existing storage and prepare for ingestion.
    ///
    /// **This is the primary method for normal operation.** The storage must
    /// already carry the profile schema; this is checked by counting its rows.
    ///
    /// # Arguments
    /// * `storage` - Storage backend containing existing profiles
    /// * `batch_size` - Number of profiles to process per chunk (default: 100)
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the batch size is zero or the
    /// storage has no usable schema
    pub async fn connect(storage: S, batch_size: Option<usize>) -> IngestionResult<Self> {
        let batch_size = Self::checked_batch_size(batch_size)?;

        let existing = storage.count_profiles().await.map_err(|e| {
            IngestionError::InvalidInput(format!(
                "Storage is not initialized ({}). Use initialize_new() for new storage.",
                e
            ))
        })?;
        debug!("Connected to storage holding {} profiles", existing);

        Ok(Self { storage, batch_size })
    }

    /// Initialize new storage.
    ///
    /// **Use this only when setting up a new database.** Creates tables and
    /// indexes; existing data in the same file is kept.
    ///
    /// # Errors
    /// Returns `IngestionError::StorageError` if schema creation fails
    pub async fn initialize_new(mut storage: S, batch_size: Option<usize>) -> IngestionResult<Self> {
        let batch_size = Self::checked_batch_size(batch_size)?;

        storage
            .initialize()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        Ok(Self { storage, batch_size })
    }

    fn checked_batch_size(batch_size: Option<usize>) -> IngestionResult<usize> {
        match batch_size.unwrap_or(DEFAULT_BATCH_SIZE) {
            0 => Err(IngestionError::InvalidInput(
                "batch size must be at least 1".to_string(),
            )),
            size => Ok(size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Consume the pipeline and hand back the storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Ingest a batch of profiles.
    ///
    /// For every profile:
    /// 1. Rejects profiles without a name (counted as failed)
    /// 2. Skips profiles whose key is already stored, including earlier rows of
    ///    the same batch
    /// 3. Persists the rest
    ///
    /// A failed insert is logged and counted; it does not abort the batch.
    ///
    /// # Errors
    /// Returns `IngestionError::StorageError` if the duplicate check itself fails
    pub async fn ingest_batch(&mut self, profiles: &[Profile]) -> IngestionResult<IngestionStats> {
        self.ingest_with_progress(profiles, |_, _| {}).await
    }

    /// Like [`ingest_batch`](Self::ingest_batch), reporting after every chunk of
    /// `batch_size` profiles.
    ///
    /// # Arguments
    /// * `profiles` - Profiles to store
    /// * `on_chunk` - Called with the running totals and the size of the chunk
    ///   just stored
    pub async fn ingest_with_progress<F>(
        &mut self,
        profiles: &[Profile],
        mut on_chunk: F,
    ) -> IngestionResult<IngestionStats>
    where
        F: FnMut(&IngestionStats, usize),
    {
        let mut stats = IngestionStats::new();
        let chunk_count = profiles.len().div_ceil(self.batch_size);

        for (index, chunk) in profiles.chunks(self.batch_size).enumerate() {
            for profile in chunk {
                self.ingest_one(profile, &mut stats).await?;
            }
            debug!(
                "Chunk {}/{} stored: {} inserted so far",
                index + 1,
                chunk_count,
                stats.inserted
            );
            on_chunk(&stats, chunk.len());
        }

        Ok(stats)
    }

    async fn ingest_one(&mut self, profile: &Profile, stats: &mut IngestionStats) -> IngestionResult<()> {
        if profile.name.trim().is_empty() {
            warn!("Skipping profile without a name: {:?}", profile);
            stats.record_failed();
            return Ok(());
        }

        let exists = self
            .storage
            .exists_by_key(&profile.match_key())
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;
        if exists {
            debug!("Duplicate profile '{}' skipped", profile.name);
            stats.record_duplicate();
            return Ok(());
        }

        match self.storage.insert_profile(profile).await {
            Ok(_) => stats.record_inserted(),
            Err(StorageError::DuplicateEntry(e)) => {
                debug!("Duplicate profile '{}' skipped: {}", profile.name, e);
                stats.record_duplicate();
            }
            Err(e) => {
                warn!("Failed to insert profile '{}': {}", profile.name, e);
                stats.record_failed();
            }
        }
        Ok(())
    }

    /// Ingest a single profile.
    ///
    /// # Returns
    /// The assigned profile ID if successful
    ///
    /// # Errors
    /// Returns `IngestionError::Duplicate` if the profile already exists,
    /// `IngestionError::InvalidInput` if it has no name
    pub async fn ingest_single(&mut self, profile: &Profile) -> IngestionResult<i64> {
        if profile.name.trim().is_empty() {
            return Err(IngestionError::InvalidInput("profile has no name".to_string()));
        }

        let exists = self
            .storage
            .exists_by_key(&profile.match_key())
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;
        if exists {
            return Err(IngestionError::Duplicate(format!(
                "Profile '{}' already exists",
                profile.name
            )));
        }

        self.storage
            .insert_profile(profile)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))
    }

    /// Ingest profiles from a provider.
    ///
    /// Fetches every profile from the provider and runs them through
    /// [`ingest_batch`](Self::ingest_batch).
    ///
    /// # Errors
    /// Returns `IngestionError::ProviderError` if profiles cannot be fetched
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: ProfileProvider + ?Sized,
    {
        let profiles = provider.fetch_profiles().await?;
        debug!("Fetched {} profiles from {}", profiles.len(), provider.name());
        self.ingest_batch(&profiles).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResult;
    use crate::storage::StorageResult;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    // ===== Mock Implementations =====

    #[derive(Clone)]
    struct MockStorage {
        state: Arc<Mutex<MockStorageState>>,
    }

    struct MockStorageState {
        profiles: Vec<Profile>,
        keys: HashSet<String>,
        next_id: i64,
        initialized: bool,
        fail_on_name: Option<String>,
        insert_calls: usize,
    }

    impl Default for MockStorageState {
        fn default() -> Self {
            Self {
                profiles: Vec::new(),
                keys: HashSet::new(),
                next_id: 1,
                initialized: false,
                fail_on_name: None,
                insert_calls: 0,
            }
        }
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockStorageState::default())),
            }
        }

        fn initialized(self) -> Self {
            self.state.lock().unwrap().initialized = true;
            self
        }

        fn with_existing(self, name: &str, destination: &str) -> Self {
            let key = buddy(name, destination).match_key();
            self.state.lock().unwrap().keys.insert(key);
            self
        }

        fn fail_insert_on_name(self, name: &str) -> Self {
            self.state.lock().unwrap().fail_on_name = Some(name.to_string());
            self
        }

        fn profile_count(&self) -> usize {
            self.state.lock().unwrap().profiles.len()
        }

        fn insert_calls(&self) -> usize {
            self.state.lock().unwrap().insert_calls
        }
    }

    #[async_trait]
    impl ProfileStorage for MockStorage {
        async fn initialize(&mut self) -> StorageResult<()> {
            self.state.lock().unwrap().initialized = true;
            Ok(())
        }

        async fn insert_profile(&mut self, profile: &Profile) -> StorageResult<i64> {
            let mut state = self.state.lock().unwrap();
            state.insert_calls += 1;
            if state.fail_on_name.as_deref() == Some(profile.name.as_str()) {
                return Err(StorageError::QueryError("Mock insert failure".to_string()));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.keys.insert(profile.match_key());
            let mut stored = profile.clone();
            stored.id = Some(id);
            state.profiles.push(stored);
            Ok(id)
        }

        async fn exists_by_key(&self, match_key: &str) -> StorageResult<bool> {
            Ok(self.state.lock().unwrap().keys.contains(match_key))
        }

        async fn get_all_profiles(&self) -> StorageResult<Vec<Profile>> {
            Ok(self.state.lock().unwrap().profiles.clone())
        }

        async fn get_profile_by_id(&self, id: i64) -> StorageResult<Profile> {
            self.state
                .lock()
                .unwrap()
                .profiles
                .iter()
                .find(|p| p.id == Some(id))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Profile {} not found", id)))
        }

        async fn count_profiles(&self) -> StorageResult<usize> {
            let state = self.state.lock().unwrap();
            if !state.initialized {
                return Err(StorageError::SchemaError("no such table: profiles".to_string()));
            }
            Ok(state.profiles.len())
        }
    }

    struct MockProvider {
        profiles: Vec<Profile>,
        should_fail: bool,
    }

    #[async_trait]
    impl ProfileProvider for MockProvider {
        async fn fetch_profiles(&self) -> ProviderResult<Vec<Profile>> {
            if self.should_fail {
                return Err(ProviderError::ParseError("Mock provider failure".to_string()));
            }
            Ok(self.profiles.clone())
        }

        fn name(&self) -> &str {
            "MockProvider"
        }
    }

    fn buddy(name: &str, destination: &str) -> Profile {
        Profile {
            destination: Some(destination.to_string()),
            language: Some("English".to_string()),
            ..Profile::named(name)
        }
    }

    // ===== Setup Tests =====

    #[tokio::test]
    async fn test_connect_requires_initialized_storage() {
        let result = IngestionPipeline::connect(MockStorage::new(), None).await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));

        let pipeline = IngestionPipeline::connect(MockStorage::new().initialized(), None)
            .await
            .unwrap();
        assert_eq!(pipeline.batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_initialize_calls_storage_initialize() {
        let storage = MockStorage::new();
        let _ = IngestionPipeline::initialize_new(storage.clone(), Some(10)).await;
        assert!(storage.state.lock().unwrap().initialized, "Storage should be initialized");
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let result = IngestionPipeline::initialize_new(MockStorage::new(), Some(0)).await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
    }

    // ===== Deduplication Tests =====

    #[tokio::test]
    async fn test_deduplication_against_storage() {
        let storage = MockStorage::new()
            .initialized()
            .with_existing("Test One", "Los Angeles");
        let mut pipeline = IngestionPipeline::connect(storage.clone(), None).await.unwrap();

        let profiles = vec![
            buddy("TEST  one", "los angeles"),
            buddy("Test One", "Paris"),
            buddy("Alpha Two", "New Delhi"),
        ];
        let stats = pipeline.ingest_batch(&profiles).await.unwrap();

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.duplicates_skipped, 1, "Same name elsewhere is a different buddy");
        assert_eq!(stats.inserted, 2);
        assert_eq!(storage.profile_count(), 2);
    }

    #[tokio::test]
    async fn test_deduplication_within_batch() {
        let storage = MockStorage::new();
        let mut pipeline = IngestionPipeline::initialize_new(storage.clone(), Some(1))
            .await
            .unwrap();

        let profiles = vec![
            buddy("Alpha Five", "Berlin"),
            buddy("alpha five", "BERLIN"),
            buddy("Test Twelve", "Berlin"),
        ];
        let stats = pipeline.ingest_batch(&profiles).await.unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(storage.insert_calls(), 2);
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let storage = MockStorage::new();
        let mut pipeline = IngestionPipeline::initialize_new(storage.clone(), Some(2))
            .await
            .unwrap();

        let profiles = vec![
            buddy("Test One", "Los Angeles"),
            buddy("Alpha Two", "New Delhi"),
            buddy("test one", "los angeles"),
            buddy("Test Four", "Paris"),
            buddy("Test Nine", "London"),
        ];
        let mut reports = Vec::new();
        let stats = pipeline
            .ingest_with_progress(&profiles, |running, size| {
                reports.push((running.total_processed, running.inserted, size))
            })
            .await
            .unwrap();

        assert_eq!(reports, vec![(2, 2, 2), (4, 3, 2), (5, 4, 1)]);
        assert_eq!(stats.inserted, 4);
        assert_eq!(stats.duplicates_skipped, 1);
    }

    // ===== Failure Tests =====

    #[tokio::test]
    async fn test_insert_failure_is_counted_not_propagated() {
        let storage = MockStorage::new().fail_insert_on_name("Test Two");
        let mut pipeline = IngestionPipeline::initialize_new(storage.clone(), None)
            .await
            .unwrap();

        let profiles = vec![
            buddy("Test One", "Los Angeles"),
            buddy("Test Two", "Los Angeles"),
            buddy("", "Nowhere"),
            buddy("Test Three", "New Delhi"),
        ];
        let stats = pipeline.ingest_batch(&profiles).await.unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.total_processed, 4);
    }

    #[tokio::test]
    async fn test_ingest_single() {
        let storage = MockStorage::new();
        let mut pipeline = IngestionPipeline::initialize_new(storage, None).await.unwrap();

        let id = pipeline.ingest_single(&buddy("Alpha Nine", "Rome")).await.unwrap();
        assert_eq!(id, 1);

        let duplicate = pipeline.ingest_single(&buddy("Alpha Nine", "Rome")).await;
        assert!(matches!(duplicate, Err(IngestionError::Duplicate(_))));

        let unnamed = pipeline.ingest_single(&buddy("  ", "Rome")).await;
        assert!(matches!(unnamed, Err(IngestionError::InvalidInput(_))));
    }

    // ===== Provider Tests =====

    #[tokio::test]
    async fn test_ingest_from_provider() {
        let provider = MockProvider {
            profiles: vec![buddy("Test Nine", "London"), buddy("Test Ten", "Milan")],
            should_fail: false,
        };
        let mut pipeline = IngestionPipeline::initialize_new(MockStorage::new(), None)
            .await
            .unwrap();
        let stats = pipeline.ingest_from_provider(&provider).await.unwrap();
        assert_eq!(stats.inserted, 2);

        // Second run only finds duplicates.
        let again = pipeline.ingest_from_provider(&provider).await.unwrap();
        assert_eq!(again.duplicates_skipped, 2);

        let mut total = stats.clone();
        total.merge(&again);
        assert_eq!(total.total_processed, 4);
        assert_eq!(pipeline.into_storage().profile_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let provider = MockProvider {
            profiles: Vec::new(),
            should_fail: true,
        };
        let mut pipeline = IngestionPipeline::initialize_new(MockStorage::new(), None)
            .await
            .unwrap();
        let result = pipeline.ingest_from_provider(&provider).await;
        assert!(matches!(result, Err(IngestionError::ProviderError(_))));
    }
}
