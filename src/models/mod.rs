//! Core data models for the buddy matching system.
//!
//! This module contains the fundamental data structures used across the application,
//! including candidate profiles, travel requests and scored match results.

use serde::{Deserialize, Serialize};

use crate::text::normalize_text;

/// A candidate travel buddy.
///
/// Every field except `name` may be missing in the source sheet. A missing field
/// never matches a request criterion, it is not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Profile {
    /// Unique identifier (assigned by storage)
    pub id: Option<i64>,

    /// Display name of the buddy
    pub name: String,

    /// City or region the buddy covers
    pub destination: Option<String>,

    /// Spoken languages, comma-separated
    pub language: Option<String>,

    /// Language spoken locally at the destination
    pub local_language: Option<String>,

    /// Interest tags, comma-separated
    pub keywords: Option<String>,

    /// Event the buddy hosts or attends
    pub event: Option<String>,

    /// Travel package the buddy offers
    pub package: Option<String>,
}

impl Profile {
    /// Create a profile with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Key used to detect duplicate profiles on ingestion.
    ///
    /// Two profiles with the same normalized name and destination are the same buddy.
    pub fn match_key(&self) -> String {
        format!(
            "{}|{}",
            normalize_text(&self.name),
            normalize_text(self.destination.as_deref().unwrap_or(""))
        )
    }
}

/// Search criteria submitted by a user looking for a buddy.
///
/// All fields are optional. A blank or absent field is "not supplied": it neither
/// filters nor scores candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BuddyRequest {
    #[serde(default)]
    pub destination: Option<String>,

    /// Comma-separated list of languages the traveller speaks
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub local_language: Option<String>,

    /// Comma-separated list of interests
    #[serde(default)]
    pub keywords: Option<String>,

    #[serde(default)]
    pub event: Option<String>,

    #[serde(default)]
    pub package: Option<String>,
}

impl BuddyRequest {
    /// Value of a criterion if it was supplied with non-blank content.
    pub fn supplied(&self, criterion: Criterion) -> Option<&str> {
        let value = match criterion {
            Criterion::Destination => self.destination.as_deref(),
            Criterion::Language => self.language.as_deref(),
            Criterion::LocalLanguage => self.local_language.as_deref(),
            Criterion::Keywords => self.keywords.as_deref(),
            Criterion::Event => self.event.as_deref(),
            Criterion::Package => self.package.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Criteria this request actually supplies, in scoring order.
    pub fn supplied_criteria(&self) -> Vec<Criterion> {
        Criterion::ALL
            .into_iter()
            .filter(|c| self.supplied(*c).is_some())
            .collect()
    }
}

/// A single request/profile comparison axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Destination,
    Language,
    LocalLanguage,
    Keywords,
    Event,
    Package,
}

impl Criterion {
    /// Every criterion, in descending default weight order.
    pub const ALL: [Criterion; 6] = [
        Criterion::Destination,
        Criterion::Language,
        Criterion::LocalLanguage,
        Criterion::Keywords,
        Criterion::Event,
        Criterion::Package,
    ];

    /// Column name used in flat sheets and exports.
    pub fn column(self) -> &'static str {
        match self {
            Criterion::Destination => "destination",
            Criterion::Language => "language",
            Criterion::LocalLanguage => "local_language",
            Criterion::Keywords => "keywords",
            Criterion::Event => "event",
            Criterion::Package => "package",
        }
    }

    /// Read the matching field of a profile.
    pub fn profile_value(self, profile: &Profile) -> Option<&str> {
        match self {
            Criterion::Destination => profile.destination.as_deref(),
            Criterion::Language => profile.language.as_deref(),
            Criterion::LocalLanguage => profile.local_language.as_deref(),
            Criterion::Keywords => profile.keywords.as_deref(),
            Criterion::Event => profile.event.as_deref(),
            Criterion::Package => profile.package.as_deref(),
        }
    }
}

/// Points contributed by one matched criterion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub points: u32,
}

/// How a profile fared against each supplied criterion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchBreakdown {
    /// Criteria that matched, with the points they earned
    pub matched: Vec<CriterionScore>,

    /// Supplied criteria the profile did not satisfy
    pub missed: Vec<Criterion>,
}

impl MatchBreakdown {
    /// Sum of all earned points.
    pub fn total(&self) -> u32 {
        self.matched
            .iter()
            .fold(0, |total: u32, m| total.saturating_add(m.points))
    }

    /// True when every supplied criterion matched.
    pub fn is_complete(&self) -> bool {
        self.missed.is_empty()
    }

    pub fn matched(&self, criterion: Criterion) -> bool {
        self.matched.iter().any(|m| m.criterion == criterion)
    }
}

/// Coarse classification of a match.
///
/// Derived from the score relative to the best score attainable for the request,
/// so clients can tell a near-perfect buddy from a partial one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStrength {
    /// Every supplied criterion matched at full weight (ratio >= 0.95)
    Perfect,

    /// Ratio >= 0.75
    Strong,

    /// Ratio >= 0.40
    Partial,

    /// Anything lower that still scored
    Weak,
}

impl MatchStrength {
    /// Classify a score against the maximum attainable score.
    ///
    /// A zero maximum (no criteria supplied) classifies as `Weak`.
    pub fn from_score(score: u32, max_score: u32) -> Self {
        if max_score == 0 {
            return MatchStrength::Weak;
        }
        let ratio = score as f64 / max_score as f64;
        if ratio >= 0.95 {
            MatchStrength::Perfect
        } else if ratio >= 0.75 {
            MatchStrength::Strong
        } else if ratio >= 0.40 {
            MatchStrength::Partial
        } else {
            MatchStrength::Weak
        }
    }
}

/// A profile together with its score for one request.
///
/// This is the primary output of the match engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredBuddy {
    pub profile: Profile,

    /// Additive weighted score (higher is better)
    pub score: u32,

    pub breakdown: MatchBreakdown,

    pub strength: MatchStrength,
}

impl ScoredBuddy {
    /// Create a scored buddy from a profile and its breakdown.
    ///
    /// # Arguments
    /// * `profile` - The candidate profile
    /// * `breakdown` - Per-criterion outcome
    /// * `max_score` - Best score attainable for the request
    pub fn new(profile: Profile, breakdown: MatchBreakdown, max_score: u32) -> Self {
        let score = breakdown.total();
        Self {
            profile,
            score,
            strength: MatchStrength::from_score(score, max_score),
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_strength_from_score() {
        assert_eq!(MatchStrength::from_score(120, 120), MatchStrength::Perfect);
        assert_eq!(MatchStrength::from_score(100, 120), MatchStrength::Strong);
        assert_eq!(MatchStrength::from_score(50, 120), MatchStrength::Partial);
        assert_eq!(MatchStrength::from_score(10, 120), MatchStrength::Weak);
        assert_eq!(MatchStrength::from_score(0, 0), MatchStrength::Weak);
    }

    #[test]
    fn test_blank_request_fields_are_not_supplied() {
        let request = BuddyRequest {
            destination: Some("Paris".to_string()),
            language: Some("   ".to_string()),
            event: Some(String::new()),
            ..BuddyRequest::default()
        };
        assert_eq!(request.supplied(Criterion::Destination), Some("Paris"));
        assert_eq!(request.supplied(Criterion::Language), None);
        assert_eq!(request.supplied(Criterion::Event), None);
        assert_eq!(request.supplied_criteria(), vec![Criterion::Destination]);
    }

    #[test]
    fn test_match_key_ignores_case_and_spacing() {
        let mut a = Profile::named("Test  One");
        a.destination = Some("Los Angeles".to_string());
        let mut b = Profile::named(" test one ");
        b.destination = Some("los   angeles".to_string());
        assert_eq!(a.match_key(), b.match_key());
    }

    #[test]
    fn test_request_deserializes_with_missing_fields() {
        let request: BuddyRequest =
            serde_json::from_str(r#"{"destination": "Berlin", "package": "Solo Traveler Buddy"}"#)
                .unwrap();
        assert_eq!(request.destination.as_deref(), Some("Berlin"));
        assert!(request.keywords.is_none());
    }

    #[test]
    fn test_request_rejects_wrong_field_type() {
        let result: Result<BuddyRequest, _> =
            serde_json::from_str(r#"{"destination": "Tokyo", "language": 123}"#);
        assert!(result.is_err());
    }
}
