//! Classification metrics for batch evaluation.
//!
//! A batch run turns "was this buddy selected into the top-k" into a binary
//! prediction per candidate, which is compared against a ground truth with the
//! usual accuracy/precision/recall/F1 measures.
//!
//! Undefined ratios (for example precision when nothing was predicted positive)
//! evaluate to 1.0.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;

/// Value used when a ratio has a zero denominator.
const ZERO_DIVISION: f64 = 1.0;

/// Errors that can occur while computing metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Label length mismatch: {truth} ground-truth labels but {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("Empty label set")]
    Empty,

    #[error("Invalid test fraction {0}: must be within (0, 1)")]
    InvalidFraction(f64),
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Binary classification quality of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    /// Compare predictions against ground truth.
    ///
    /// # Errors
    /// Returns `MetricsError::LengthMismatch` if the slices differ in length and
    /// `MetricsError::Empty` if both are empty
    pub fn compute(y_true: &[bool], y_pred: &[bool]) -> MetricsResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(MetricsError::LengthMismatch {
                truth: y_true.len(),
                predicted: y_pred.len(),
            });
        }
        if y_true.is_empty() {
            return Err(MetricsError::Empty);
        }

        let (mut tp, mut tn, mut fp, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            match (truth, pred) {
                (true, true) => tp += 1,
                (false, false) => tn += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
            }
        }

        let accuracy = (tp + tn) as f64 / y_true.len() as f64;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = ratio(2 * tp, 2 * tp + fp + fn_);

        Ok(Self {
            accuracy,
            precision,
            recall,
            f1,
        })
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        ZERO_DIVISION
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Placeholder labels: the first half of the batch positive, the rest negative.
///
/// Stands in until real labels exist; it says nothing about match quality.
pub fn synthetic_ground_truth(len: usize) -> Vec<bool> {
    (0..len).map(|i| i < len / 2).collect()
}

/// One prediction per batch position, positive where the position was selected.
///
/// Out-of-range positions are ignored.
pub fn predictions_from_selection(len: usize, selected: &[usize]) -> Vec<bool> {
    let mut predictions = vec![false; len];
    for &position in selected {
        if let Some(slot) = predictions.get_mut(position) {
            *slot = true;
        }
    }
    predictions
}

/// Shuffle with a fixed seed and split off `ceil(n * test_fraction)` items.
///
/// # Returns
/// `(train, test)`, both in shuffled order. The same seed always yields the
/// same split.
///
/// # Errors
/// Returns `MetricsError::InvalidFraction` unless `0 < test_fraction < 1`
pub fn train_test_split<T>(
    mut items: Vec<T>,
    test_fraction: f64,
    seed: u64,
) -> MetricsResult<(Vec<T>, Vec<T>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(MetricsError::InvalidFraction(test_fraction));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let test_len = ((items.len() as f64) * test_fraction).ceil() as usize;
    let test = items.split_off(items.len() - test_len.min(items.len()));
    Ok((items, test))
}
