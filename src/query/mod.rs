//! Query processing and ranking module.
//!
//! This module scores every candidate profile against a request, applies the
//! eligibility policy and returns the top-k results. It coordinates between the
//! scorer and the storage layer.
//!
//! # Usage
//!
//! ```rust,no_run
//! use buddy_match::config::MatchConfig;
//! use buddy_match::models::BuddyRequest;
//! use buddy_match::query::{BruteForceMatchEngine, MatchEngine, MatchQuery};
//! use buddy_match::storage::memory::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new();
//! let engine = BruteForceMatchEngine::new(storage, MatchConfig::default());
//!
//! let request = BuddyRequest {
//!     destination: Some("Los Angeles".to_string()),
//!     language: Some("English,Spanish".to_string()),
//!     ..BuddyRequest::default()
//! };
//! let results = engine.find_best_buddies(&MatchQuery::new(request, None)).await?;
//!
//! // Results are sorted by descending score
//! for result in results {
//!     println!("{} - Score: {}", result.profile.name, result.score);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{MatchConfig, MatchPolicy};
use crate::models::{BuddyRequest, Profile, ScoredBuddy};
use crate::scoring::{Scorer, WeightedScorer};
use crate::storage::ProfileStorage;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// No candidate cleared the matching rules
    #[error("No matching buddies found: {0}")]
    NoMatches(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Match query parameters.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub request: BuddyRequest,

    /// Maximum number of results; the engine's configured `top_k` when `None`
    pub top_k: Option<usize>,
}

impl MatchQuery {
    /// Create a new match query.
    ///
    /// # Arguments
    /// * `request` - The user's criteria
    /// * `top_k` - Override of the configured result count
    pub fn new(request: BuddyRequest, top_k: Option<usize>) -> Self {
        Self { request, top_k }
    }
}

/// Trait for match engines.
#[async_trait]
pub trait MatchEngine: Send + Sync {
    /// Execute a match query and return ranked results.
    ///
    /// # Returns
    /// Up to `top_k` scored buddies, highest score first, ties in storage order
    ///
    /// # Errors
    /// Returns `QueryError::NoMatches` when no candidate is eligible, and
    /// `QueryError::StorageError` if candidates cannot be loaded
    async fn find_best_buddies(&self, query: &MatchQuery) -> QueryResult<Vec<ScoredBuddy>>;

    /// Number of candidates the engine searches over.
    async fn candidate_count(&self) -> QueryResult<usize>;
}

/// Score, filter and rank a candidate set.
///
/// This is a pure function of its inputs: profiles are consumed in order and the
/// sort is stable, so equal scores keep their input order. Zero-score candidates
/// are always dropped; under `MatchPolicy::Strict` a candidate must also satisfy
/// every supplied criterion.
pub fn rank_profiles<S: Scorer + ?Sized>(
    scorer: &S,
    profiles: Vec<Profile>,
    request: &BuddyRequest,
    policy: MatchPolicy,
    top_k: usize,
) -> Vec<ScoredBuddy> {
    let max_score = scorer.max_score(request);

    let mut results: Vec<ScoredBuddy> = profiles
        .into_iter()
        .filter_map(|profile| {
            let breakdown = scorer.score(request, &profile);
            debug!("Buddy '{}' scored {}", profile.name, breakdown.total());
            let eligible = breakdown.total() > 0
                && (policy == MatchPolicy::Ranked || breakdown.is_complete());
            eligible.then(|| ScoredBuddy::new(profile, breakdown, max_score))
        })
        .collect();

    // Vec::sort_by is stable
    results.sort_by(|a, b| b.score.cmp(&a.score));
    results.truncate(top_k);
    results
}

/// Default brute-force match engine implementation.
///
/// This implementation retrieves all profiles from storage and scores each one.
/// It's suitable for the sheet-sized candidate sets this system works with.
pub struct BruteForceMatchEngine<S>
where
    S: ProfileStorage,
{
    /// Storage backend for profile retrieval
    storage: S,

    scorer: WeightedScorer,
}

impl<S> BruteForceMatchEngine<S>
where
    S: ProfileStorage,
{
    /// Create a new brute-force match engine.
    ///
    /// # Arguments
    /// * `storage` - Storage backend for retrieving profiles
    /// * `config` - Weights, policy and result count
    pub fn new(storage: S, config: MatchConfig) -> Self {
        Self {
            storage,
            scorer: WeightedScorer::new(config),
        }
    }

    pub fn config(&self) -> &MatchConfig {
        self.scorer.config()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[async_trait]
impl<S> MatchEngine for BruteForceMatchEngine<S>
where
    S: ProfileStorage,
{
    async fn find_best_buddies(&self, query: &MatchQuery) -> QueryResult<Vec<ScoredBuddy>> {
        let config = self.scorer.config();
        let top_k = query.top_k.unwrap_or(config.top_k);
        if top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be at least 1".to_string()));
        }
        info!("Starting buddy matching with request: {:?}", query.request);

        // 1. Retrieve all candidates from storage
        let profiles = self
            .storage
            .get_all_profiles()
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;
        let candidates = profiles.len();

        // 2. Score, filter and rank
        let results = rank_profiles(&self.scorer, profiles, &query.request, config.policy, top_k);

        match results.first() {
            Some(top) => {
                info!(
                    "Top {} of {} candidates selected, best match: {} ({})",
                    results.len(),
                    candidates,
                    top.profile.name,
                    top.score
                );
                Ok(results)
            }
            None => {
                info!("No eligible buddy among {} candidates", candidates);
                Err(QueryError::NoMatches(format!(
                    "none of {} candidates matched the request",
                    candidates
                )))
            }
        }
    }

    async fn candidate_count(&self) -> QueryResult<usize> {
        self.storage
            .count_profiles()
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageError, StorageResult};

    // Mock ProfileStorage for testing
    struct MockStorage {
        profiles: Vec<Profile>,
        should_fail: bool,
    }

    impl MockStorage {
        fn new(profiles: Vec<Profile>) -> Self {
            Self {
                profiles,
                should_fail: false,
            }
        }

        fn with_failure() -> Self {
            Self {
                profiles: Vec::new(),
                should_fail: true,
            }
        }
    }

    #[async_trait]
    impl ProfileStorage for MockStorage {
        async fn initialize(&mut self) -> StorageResult<()> {
            Ok(())
        }

        async fn insert_profile(&mut self, _profile: &Profile) -> StorageResult<i64> {
            Ok(1)
        }

        async fn exists_by_key(&self, _match_key: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn get_all_profiles(&self) -> StorageResult<Vec<Profile>> {
            if self.should_fail {
                return Err(StorageError::QueryError("Mock storage failure".to_string()));
            }
            Ok(self.profiles.clone())
        }

        async fn get_profile_by_id(&self, id: i64) -> StorageResult<Profile> {
            self.profiles
                .iter()
                .find(|p| p.id == Some(id))
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Profile {} not found", id)))
        }

        async fn count_profiles(&self) -> StorageResult<usize> {
            Ok(self.profiles.len())
        }
    }

    fn create_test_profile(id: i64, name: &str, destination: &str, language: &str, keywords: &str) -> Profile {
        Profile {
            id: Some(id),
            name: name.to_string(),
            destination: Some(destination.to_string()),
            language: Some(language.to_string()),
            local_language: None,
            keywords: Some(keywords.to_string()),
            event: Some("City Tour".to_string()),
            package: Some("Solo Traveler Buddy".to_string()),
        }
    }

    fn paris_request(keywords: &str) -> BuddyRequest {
        BuddyRequest {
            destination: Some("Paris".to_string()),
            language: Some("French".to_string()),
            keywords: Some(keywords.to_string()),
            ..BuddyRequest::default()
        }
    }

    fn many_paris_profiles(count: i64) -> Vec<Profile> {
        (1..=count)
            .map(|i| {
                let keywords = ["art", "food", "history", "fashion"]
                    .iter()
                    .take((i % 4 + 1) as usize)
                    .copied()
                    .collect::<Vec<_>>()
                    .join(",");
                create_test_profile(i, &format!("Buddy {}", i), "Paris", "French", &keywords)
            })
            .collect()
    }

    #[test]
    fn test_match_query_defaults() {
        let query = MatchQuery::new(BuddyRequest::default(), None);
        assert!(query.top_k.is_none());
    }

    #[tokio::test]
    async fn test_results_sorted_and_truncated() {
        let engine = BruteForceMatchEngine::new(
            MockStorage::new(many_paris_profiles(12)),
            MatchConfig::default(),
        );
        let query = MatchQuery::new(paris_request("art,food,history,fashion"), None);
        let results = engine.find_best_buddies(&query).await.unwrap();

        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        // Buddies 3, 7 and 11 carry all four keywords.
        assert_eq!(results[0].profile.name, "Buddy 3");
        assert_eq!(results[1].profile.name, "Buddy 7");
        assert_eq!(results[2].profile.name, "Buddy 11");
    }

    #[tokio::test]
    async fn test_top_k_override() {
        let engine = BruteForceMatchEngine::new(
            MockStorage::new(many_paris_profiles(8)),
            MatchConfig::default(),
        );
        let query = MatchQuery::new(paris_request("art"), Some(2));
        assert_eq!(engine.find_best_buddies(&query).await.unwrap().len(), 2);

        let zero = MatchQuery::new(paris_request("art"), Some(0));
        assert!(matches!(
            engine.find_best_buddies(&zero).await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_ties_keep_storage_order() {
        let profiles = vec![
            create_test_profile(1, "First", "Berlin", "German", "history"),
            create_test_profile(2, "Second", "Berlin", "German", "nightlife"),
            create_test_profile(3, "Third", "Berlin", "German", "art"),
        ];
        let engine = BruteForceMatchEngine::new(MockStorage::new(profiles), MatchConfig::default());
        let request = BuddyRequest {
            destination: Some("Berlin".to_string()),
            language: Some("German,English".to_string()),
            ..BuddyRequest::default()
        };
        let results = engine.find_best_buddies(&MatchQuery::new(request, None)).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.profile.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_strict_policy_requires_every_supplied_criterion() {
        let profiles = vec![create_test_profile(1, "Claire", "Paris", "French", "art")];
        let engine = BruteForceMatchEngine::new(MockStorage::new(profiles.clone()), MatchConfig::default());

        let mut request = paris_request("art");
        request.package = Some("Tech Conference Buddy".to_string());
        let result = engine.find_best_buddies(&MatchQuery::new(request.clone(), None)).await;
        assert!(matches!(result, Err(QueryError::NoMatches(_))));

        let ranked = BruteForceMatchEngine::new(
            MockStorage::new(profiles),
            MatchConfig::default().with_policy(MatchPolicy::Ranked),
        );
        let results = ranked.find_best_buddies(&MatchQuery::new(request, None)).await.unwrap();
        assert_eq!(results[0].score, 50 + 30 + 10);
        assert!(!results[0].breakdown.is_complete());
    }

    #[tokio::test]
    async fn test_zero_scores_never_returned() {
        let profiles = vec![create_test_profile(1, "Claire", "Paris", "French", "art")];
        let engine = BruteForceMatchEngine::new(
            MockStorage::new(profiles),
            MatchConfig::default().with_policy(MatchPolicy::Ranked),
        );
        let request = BuddyRequest {
            destination: Some("Atlantis".to_string()),
            language: Some("Elvish".to_string()),
            ..BuddyRequest::default()
        };
        let result = engine.find_best_buddies(&MatchQuery::new(request, None)).await;
        assert!(matches!(result, Err(QueryError::NoMatches(_))));

        let empty = engine
            .find_best_buddies(&MatchQuery::new(BuddyRequest::default(), None))
            .await;
        assert!(matches!(empty, Err(QueryError::NoMatches(_))));
    }

    #[tokio::test]
    async fn test_storage_error_propagation() {
        let engine = BruteForceMatchEngine::new(MockStorage::with_failure(), MatchConfig::default());
        let result = engine
            .find_best_buddies(&MatchQuery::new(paris_request("art"), None))
            .await;
        match result.unwrap_err() {
            QueryError::StorageError(_) => {}
            other => panic!("Expected StorageError, got {:?}", other),
        }
    }

    #[test]
    fn test_rank_profiles_is_pure() {
        let profiles = many_paris_profiles(6);
        let scorer = WeightedScorer::default();
        let request = paris_request("food,history");
        let first = rank_profiles(&scorer, profiles.clone(), &request, MatchPolicy::Strict, 5);
        let second = rank_profiles(&scorer, profiles, &request, MatchPolicy::Strict, 5);
        assert_eq!(first, second);
        assert!(first.len() <= 5);
    }

    #[tokio::test]
    async fn test_candidate_count() {
        let engine = BruteForceMatchEngine::new(
            MockStorage::new(many_paris_profiles(3)),
            MatchConfig::default(),
        );
        assert_eq!(engine.candidate_count().await.unwrap(), 3);
        assert_eq!(engine.storage().get_profile_by_id(2).await.unwrap().name, "Buddy 2");
    }
}
