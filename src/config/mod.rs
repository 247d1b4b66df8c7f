//! Configuration for matching, serving and file locations.
//!
//! Everything the binaries need is gathered in [`AppConfig`], which can be loaded
//! from a TOML file. Missing sections and keys fall back to defaults, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [matching]
//! top_k = 5
//! policy = "strict"
//! keyword_scoring = "per_keyword"
//!
//! [matching.weights]
//! destination = 50
//! language = 30
//!
//! [matching.synonyms]
//! food = ["cuisine", "culinary"]
//!
//! [server]
//! port = 8000
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Criterion;
use crate::server::ServerConfig;
use crate::text::normalize_text;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default number of buddies returned per request.
pub const DEFAULT_TOP_K: usize = 5;

/// Largest accepted weight for a single criterion.
pub const MAX_WEIGHT: u32 = 1_000_000;

/// Points awarded for each satisfied criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringWeights {
    pub destination: u32,
    pub language: u32,
    pub local_language: u32,
    pub keyword: u32,
    pub event: u32,
    pub package: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            destination: 50,
            language: 30,
            local_language: 20,
            keyword: 10,
            event: 5,
            package: 5,
        }
    }
}

impl ScoringWeights {
    /// Weight of a single criterion (per overlapping keyword for `Keywords`).
    pub fn weight(&self, criterion: Criterion) -> u32 {
        match criterion {
            Criterion::Destination => self.destination,
            Criterion::Language => self.language,
            Criterion::LocalLanguage => self.local_language,
            Criterion::Keywords => self.keyword,
            Criterion::Event => self.event,
            Criterion::Package => self.package,
        }
    }
}

/// How keyword overlap turns into points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeywordScoring {
    /// The keyword weight is awarded once per distinct overlapping request keyword
    #[default]
    PerKeyword,

    /// The keyword weight is awarded once, however many keywords overlap
    Once,
}

/// Which scored candidates are eligible to be returned.
///
/// Zero-score candidates are never returned, whatever the policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every supplied criterion must match
    #[default]
    Strict,

    /// Any candidate with a positive score is eligible
    Ranked,
}

/// Keyword synonym table used to expand request keywords before overlap checks.
///
/// Lookups are symmetric: `food = ["cuisine"]` also lets `cuisine` match `food`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SynonymTable(HashMap<String, Vec<String>>);

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register synonyms for a keyword.
    pub fn insert(&mut self, keyword: &str, synonyms: &[&str]) {
        self.0.insert(
            keyword.to_string(),
            synonyms.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// All normalized spellings that count as `keyword`, the keyword itself first.
    pub fn expand(&self, keyword: &str) -> Vec<String> {
        let keyword = normalize_text(keyword);
        let mut forms = vec![keyword.clone()];
        for (head, synonyms) in &self.0 {
            let head = normalize_text(head);
            let synonyms: Vec<String> = synonyms.iter().map(|s| normalize_text(s)).collect();
            if head == keyword || synonyms.contains(&keyword) {
                for form in std::iter::once(head).chain(synonyms) {
                    if !form.is_empty() && !forms.contains(&form) {
                        forms.push(form);
                    }
                }
            }
        }
        forms
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameters of the scoring and ranking rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchConfig {
    pub weights: ScoringWeights,
    pub keyword_scoring: KeywordScoring,
    pub policy: MatchPolicy,

    /// Maximum number of buddies returned
    pub top_k: usize,

    pub synonyms: SynonymTable,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            keyword_scoring: KeywordScoring::default(),
            policy: MatchPolicy::default(),
            top_k: DEFAULT_TOP_K,
            synonyms: SynonymTable::default(),
        }
    }
}

impl MatchConfig {
    /// Same configuration with another eligibility policy.
    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check values that would make ranking meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        for criterion in Criterion::ALL {
            let weight = self.weights.weight(criterion);
            if weight == 0 || weight > MAX_WEIGHT {
                return Err(ConfigError::Invalid(format!(
                    "weight for '{}' must be between 1 and {}, got {}",
                    criterion.column(),
                    MAX_WEIGHT,
                    weight
                )));
            }
        }
        Ok(())
    }
}

/// File locations used by the binaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataConfig {
    /// Profile sheet (CSV)
    pub profiles_path: PathBuf,

    /// SQLite database
    pub db_path: PathBuf,

    /// Where batch evaluation writes the detailed top matches
    pub export_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            profiles_path: PathBuf::from("data/buddies.csv"),
            db_path: PathBuf::from("buddies.db"),
            export_path: PathBuf::from("top_matching_buddies.csv"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub matching: MatchConfig,
    pub server: ServerConfig,
    pub data: DataConfig,
}

impl AppConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.matching.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, `ConfigError::Parse`
    /// if it is not valid TOML for this schema
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load from `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
