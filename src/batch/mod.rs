//! Batch evaluation.
//!
//! Runs one request against a whole batch of candidate profiles, writes the
//! detailed top matches to CSV and, when labels are available, scores the
//! selection with [`ClassificationMetrics`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::MatchConfig;
use crate::metrics::{predictions_from_selection, ClassificationMetrics, MetricsResult};
use crate::models::{BuddyRequest, Criterion, Profile, ScoredBuddy};
use crate::query::rank_profiles;
use crate::scoring::WeightedScorer;

/// Outcome of processing one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Name of the batch in logs, e.g. `train` or `test`
    pub label: String,

    /// Number of candidates in the batch
    pub candidates: usize,

    /// Ranked top matches
    pub top: Vec<ScoredBuddy>,

    /// Batch positions of the top matches, in rank order
    pub selected_positions: Vec<usize>,

    pub metrics: Option<ClassificationMetrics>,

    /// Where the top matches were written, if the export succeeded
    pub exported_to: Option<PathBuf>,

    /// Why the export failed, if it did
    pub export_error: Option<String>,
}

/// Applies the match rule to candidate batches.
pub struct BatchProcessor {
    scorer: WeightedScorer,
    export_path: Option<PathBuf>,
}

impl BatchProcessor {
    /// Create a processor.
    ///
    /// # Arguments
    /// * `config` - Matching rule used for every batch
    /// * `export_path` - CSV file receiving the top matches; `None` disables export
    pub fn new(config: MatchConfig, export_path: Option<PathBuf>) -> Self {
        Self {
            scorer: WeightedScorer::new(config),
            export_path,
        }
    }

    /// Rank one batch, export it and compute metrics.
    ///
    /// An export failure is logged and recorded in the report, never returned.
    ///
    /// # Errors
    /// Returns `MetricsError` if `ground_truth` does not have one label per profile
    pub fn process_batch(
        &self,
        label: &str,
        profiles: &[Profile],
        request: &BuddyRequest,
        ground_truth: Option<&[bool]>,
    ) -> MetricsResult<BatchReport> {
        let config = self.scorer.config();
        let top = rank_profiles(
            &self.scorer,
            profiles.to_vec(),
            request,
            config.policy,
            config.top_k,
        );
        let selected_positions = locate(profiles, &top);

        info!("[{}] Top {} matching buddies of {}", label, top.len(), profiles.len());
        for (rank, (buddy, position)) in top.iter().zip(&selected_positions).enumerate() {
            info!(
                "[{}] #{} {} (position {}), score {}",
                label,
                rank + 1,
                buddy.profile.name,
                position,
                buddy.score
            );
        }

        let (exported_to, export_error) = match &self.export_path {
            Some(path) => match export_top_matches(path, request, &top) {
                Ok(()) => {
                    info!("[{}] Top matching buddies saved to {}", label, path.display());
                    (Some(path.clone()), None)
                }
                Err(e) => {
                    warn!("[{}] Error saving top buddies to {}: {}", label, path.display(), e);
                    (None, Some(e.to_string()))
                }
            },
            None => (None, None),
        };

        let metrics = match ground_truth {
            Some(truth) => {
                let predictions = predictions_from_selection(profiles.len(), &selected_positions);
                let metrics = ClassificationMetrics::compute(truth, &predictions)?;
                info!(
                    "[{}] Batch Metrics - Accuracy: {:.2}, Precision: {:.2}, Recall: {:.2}, F1 Score: {:.2}",
                    label, metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
                );
                Some(metrics)
            }
            None => None,
        };

        Ok(BatchReport {
            label: label.to_string(),
            candidates: profiles.len(),
            top,
            selected_positions,
            metrics,
            exported_to,
            export_error,
        })
    }
}

/// Map ranked results back to their batch positions.
///
/// Identical profiles are assigned to distinct positions in input order.
fn locate(profiles: &[Profile], top: &[ScoredBuddy]) -> Vec<usize> {
    let mut taken = vec![false; profiles.len()];
    top.iter()
        .filter_map(|buddy| {
            let position = profiles
                .iter()
                .enumerate()
                .position(|(i, p)| !taken[i] && *p == buddy.profile)?;
            taken[position] = true;
            Some(position)
        })
        .collect()
}

/// Columns of the export: `name`, each supplied criterion that has at least one
/// value among the exported rows, then `score`.
fn export_columns(request: &BuddyRequest, top: &[ScoredBuddy]) -> Vec<Criterion> {
    request
        .supplied_criteria()
        .into_iter()
        .filter(|criterion| {
            top.iter()
                .any(|buddy| criterion.profile_value(&buddy.profile).is_some())
        })
        .collect()
}

/// Write the top matches to a CSV file.
pub fn export_top_matches(
    path: &Path,
    request: &BuddyRequest,
    top: &[ScoredBuddy],
) -> Result<(), csv::Error> {
    let columns = export_columns(request, top);
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["name"];
    header.extend(columns.iter().map(|c| c.column()));
    header.push("score");
    writer.write_record(&header)?;

    for buddy in top {
        let mut row = vec![buddy.profile.name.clone()];
        row.extend(
            columns
                .iter()
                .map(|c| c.profile_value(&buddy.profile).unwrap_or_default().to_string()),
        );
        row.push(buddy.score.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::synthetic_ground_truth;

    fn buddy(name: &str, destination: &str, language: &str, event: Option<&str>) -> Profile {
        Profile {
            destination: Some(destination.to_string()),
            language: Some(language.to_string()),
            event: event.map(str::to_string),
            ..Profile::named(name)
        }
    }

    fn batch() -> Vec<Profile> {
        vec![
            buddy("Alpha Eleven", "Paris", "French,English", None),
            buddy("Alpha Five", "Berlin", "German,English", Some("City Tour")),
            buddy("Test Four", "Paris", "English", None),
            buddy("Test Nine", "London", "English", Some("Music Festival")),
        ]
    }

    fn paris_request() -> BuddyRequest {
        BuddyRequest {
            destination: Some("Paris".to_string()),
            language: Some("English".to_string()),
            event: Some("Art Exhibit".to_string()),
            ..BuddyRequest::default()
        }
    }

    fn ranked() -> MatchConfig {
        MatchConfig::default().with_policy(crate::config::MatchPolicy::Ranked)
    }

    #[test]
    fn test_process_batch_ranks_and_scores() {
        let profiles = batch();
        let processor = BatchProcessor::new(ranked(), None);
        let truth = synthetic_ground_truth(profiles.len());
        let report = processor
            .process_batch("train", &profiles, &paris_request(), Some(truth.as_slice()))
            .unwrap();

        assert_eq!(report.candidates, 4);
        assert_eq!(report.top[0].profile.name, "Alpha Eleven");
        assert_eq!(report.top[0].score, 80);
        assert_eq!(report.selected_positions, vec![0, 2, 1, 3]);
        let metrics = report.metrics.unwrap();
        assert!((metrics.recall - 1.0).abs() < 1e-9);
        assert!((metrics.precision - 0.5).abs() < 1e-9);
        assert!(report.exported_to.is_none());
        assert!(report.export_error.is_none());
    }

    #[test]
    fn test_ground_truth_length_mismatch() {
        let processor = BatchProcessor::new(ranked(), None);
        let result = processor.process_batch("test", &batch(), &paris_request(), Some(&[true][..]));
        assert!(result.is_err());
    }

    #[test]
    fn test_export_drops_empty_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.csv");
        let processor = BatchProcessor::new(ranked(), Some(path.clone()));

        let mut request = paris_request();
        request.event = None;
        request.package = Some("Shopping Enthusiast".to_string());
        let report = processor.process_batch("train", &batch(), &request, None).unwrap();
        assert_eq!(report.exported_to.as_deref(), Some(path.as_path()));

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("name,destination,language,score"));
        assert_eq!(lines.next(), Some("Alpha Eleven,Paris,\"French,English\",80"));
    }

    #[test]
    fn test_export_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("top.csv");
        let processor = BatchProcessor::new(ranked(), Some(path));
        let report = processor
            .process_batch("train", &batch(), &paris_request(), None)
            .unwrap();
        assert!(report.exported_to.is_none());
        assert!(report.export_error.is_some());
        assert!(!report.top.is_empty());
    }

    #[test]
    fn test_duplicate_profiles_get_distinct_positions() {
        let twin = buddy("Twin", "Paris", "English", None);
        let profiles = vec![twin.clone(), twin];
        let processor = BatchProcessor::new(ranked(), None);
        let report = processor
            .process_batch("train", &profiles, &paris_request(), None)
            .unwrap();
        assert_eq!(report.selected_positions, vec![0, 1]);
    }
}
