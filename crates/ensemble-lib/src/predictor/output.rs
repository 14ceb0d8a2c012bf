//! Output formatting for ensemble predictions
//!
//! Turns raw per-model outputs into a `PredictionResult`: picks the win
//! probability column, labels the bucket distribution, and passes the
//! regression estimate through untouched.

use crate::forest::argmax;
use crate::models::PredictionResult;
use std::collections::BTreeMap;

/// Index of the "win" class in the binary model's class order
pub const WIN_CLASS_INDEX: usize = 1;

/// Formats raw model outputs into prediction results
pub struct OutputFormatter<'a> {
    bucket_labels: &'a [String],
}

impl<'a> OutputFormatter<'a> {
    pub fn new(bucket_labels: &'a [String]) -> Self {
        Self { bucket_labels }
    }

    /// Probability mass on the win class. A classifier that only saw one
    /// class reports a single column; that value is used as-is.
    pub fn win_probability(binary_proba: &[f32]) -> f32 {
        match binary_proba {
            [] => f32::NAN,
            [only] => *only,
            probs => probs[WIN_CLASS_INDEX],
        }
    }

    /// Label with the highest probability; ties go to the lowest bucket
    pub fn predicted_bucket(&self, bucket_proba: &[f32]) -> String {
        let idx = argmax(bucket_proba);
        self.bucket_labels
            .get(idx)
            .cloned()
            .unwrap_or_default()
    }

    pub fn bucket_probabilities(&self, bucket_proba: &[f32]) -> BTreeMap<String, f32> {
        self.bucket_labels
            .iter()
            .cloned()
            .zip(bucket_proba.iter().copied())
            .collect()
    }

    /// The regression estimate is reported raw; no clamping at serving time
    pub fn format(&self, binary_proba: &[f32], bucket_proba: &[f32], mfe_estimate: f32) -> PredictionResult {
        PredictionResult {
            win_probability: Self::win_probability(binary_proba),
            predicted_bucket: self.predicted_bucket(bucket_proba),
            bucket_probabilities: self.bucket_probabilities(bucket_proba),
            mfe_estimate,
        }
    }
}
