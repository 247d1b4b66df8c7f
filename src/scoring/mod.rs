//! Relevance scoring of a profile against a request.
//!
//! A score is the sum of fixed weights for each satisfied predicate:
//!
//! | criterion      | predicate                                                  |
//! |----------------|------------------------------------------------------------|
//! | destination    | request destination is a substring of the profile's        |
//! | language       | a request language equals one of the profile languages     |
//! | local language | request and profile local language are equal               |
//! | keywords       | request keywords (with synonyms) overlap the profile tags  |
//! | event          | request event is a substring of the profile event          |
//! | package        | request package is a substring of the profile package      |
//!
//! All comparisons are case-insensitive and whitespace-normalized. Criteria the
//! request does not supply are skipped; profile fields that are missing never match.

use crate::config::{KeywordScoring, MatchConfig};
use crate::models::{BuddyRequest, Criterion, CriterionScore, MatchBreakdown, Profile};
use crate::text::{contains_normalized, normalize_text, split_tags};

/// Trait for request/profile scorers.
///
/// The method is infallible: anything that cannot be compared is a non-match.
pub trait Scorer: Send + Sync {
    /// Evaluate every supplied criterion of `request` against `profile`.
    fn score(&self, request: &BuddyRequest, profile: &Profile) -> MatchBreakdown;

    /// Best score any profile could reach for this request.
    fn max_score(&self, request: &BuddyRequest) -> u32;
}

/// Additive weighted scorer configured by [`MatchConfig`].
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    config: MatchConfig,
}

impl WeightedScorer {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Points for one criterion, or `None` if it did not match.
    fn criterion_points(&self, criterion: Criterion, wanted: &str, profile: &Profile) -> Option<u32> {
        let have = criterion.profile_value(profile)?;
        let weight = self.config.weights.weight(criterion);
        let matched = match criterion {
            Criterion::Destination | Criterion::Event | Criterion::Package => {
                contains_normalized(have, wanted)
            }
            Criterion::Language => {
                let spoken = split_tags(have);
                split_tags(wanted).iter().any(|lang| spoken.contains(lang))
            }
            Criterion::LocalLanguage => {
                let wanted = normalize_text(wanted);
                !wanted.is_empty() && normalize_text(have) == wanted
            }
            Criterion::Keywords => {
                let overlap = self.keyword_overlap(wanted, have);
                if overlap == 0 {
                    return None;
                }
                return Some(match self.config.keyword_scoring {
                    KeywordScoring::PerKeyword => weight.saturating_mul(overlap),
                    KeywordScoring::Once => weight,
                });
            }
        };
        matched.then_some(weight)
    }

    /// Number of distinct request keywords found among the profile tags.
    fn keyword_overlap(&self, wanted: &str, have: &str) -> u32 {
        let tags = split_tags(have);
        split_tags(wanted)
            .iter()
            .filter(|keyword| {
                self.config
                    .synonyms
                    .expand(keyword)
                    .iter()
                    .any(|form| tags.contains(form))
            })
            .count() as u32
    }
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl Scorer for WeightedScorer {
    fn score(&self, request: &BuddyRequest, profile: &Profile) -> MatchBreakdown {
        let mut breakdown = MatchBreakdown::default();
        for criterion in Criterion::ALL {
            let Some(wanted) = request.supplied(criterion) else {
                continue;
            };
            match self.criterion_points(criterion, wanted, profile) {
                Some(points) => breakdown.matched.push(CriterionScore { criterion, points }),
                None => breakdown.missed.push(criterion),
            }
        }
        breakdown
    }

    fn max_score(&self, request: &BuddyRequest) -> u32 {
        request
            .supplied_criteria()
            .into_iter()
            .map(|criterion| {
                let weight = self.config.weights.weight(criterion);
                match (criterion, self.config.keyword_scoring) {
                    (Criterion::Keywords, KeywordScoring::PerKeyword) => {
                        let count = request.keywords.as_deref().map(split_tags).map_or(0, |t| t.len());
                        weight.saturating_mul(count as u32)
                    }
                    _ => weight,
                }
            })
            .fold(0, u32::saturating_add)
    }
}
