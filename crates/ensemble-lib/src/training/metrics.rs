//! Held-out evaluation metrics on top of `smartcore::metrics`
//!
//! Inputs are converted to `f64` vectors. Cases the engine leaves undefined
//! (single-class AUC, empty partitions, constant targets) are resolved here
//! so the manifest never carries a non-finite number.

use smartcore::metrics;
use smartcore::metrics::Metrics;

fn widen(values: &[f32]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

/// Area under the ROC curve from 0/1 labels and scores, tied scores sharing
/// their average rank. `None` when only one class is present.
pub fn roc_auc(labels: &[f32], scores: &[f32]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1.0).count();
    if positives == 0 || positives == labels.len() || labels.len() != scores.len() {
        return None;
    }
    let auc = metrics::roc_auc_score(&widen(labels), &widen(scores));
    auc.is_finite().then_some(auc)
}

/// Fraction of positions where prediction equals truth
pub fn accuracy(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() || truth.len() != predicted.len() {
        return 0.0;
    }
    metrics::accuracy::Accuracy::<f64>::new().get_score(&truth.to_vec(), &predicted.to_vec())
}

pub fn mean_absolute_error(truth: &[f32], predicted: &[f32]) -> f64 {
    if truth.is_empty() || truth.len() != predicted.len() {
        return 0.0;
    }
    metrics::mean_absolute_error(&widen(truth), &widen(predicted))
}

/// Coefficient of determination. A constant target scores 1.0 on an exact
/// fit and 0.0 otherwise.
pub fn r2_score(truth: &[f32], predicted: &[f32]) -> f64 {
    if truth.is_empty() || truth.len() != predicted.len() {
        return 0.0;
    }
    if truth.iter().all(|&t| t == truth[0]) {
        return if truth == predicted { 1.0 } else { 0.0 };
    }
    let r2 = metrics::r2(&widen(truth), &widen(predicted));
    if r2.is_finite() {
        r2
    } else {
        0.0
    }
}
