//! Feature schema and MFE bucket discretization
//!
//! The schema is derived once per training run and travels with the models
//! it describes. `feature_names` defines vector positions: the order used to
//! build training rows is the order used to build inference vectors.

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default lower edges of the MFE buckets, in R multiples
pub const DEFAULT_BUCKET_EDGES: [f64; 5] = [0.0, 0.5, 1.0, 1.5, 2.0];

/// Default labels matching `DEFAULT_BUCKET_EDGES`
pub const DEFAULT_BUCKET_LABELS: [&str; 5] = ["<0.5R", "0.5-1R", "1-1.5R", "1.5-2R", "2R+"];

/// Ordered, left-closed/right-open intervals over the MFE target.
///
/// `edges[i]` is the inclusive lower bound of bucket `i`; the upper bound is
/// `edges[i + 1]`, and +inf for the last bucket. Labels map class indices to
/// names and must have the same length as `edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketScheme {
    pub edges: Vec<f64>,
    pub labels: Vec<String>,
}

impl Default for BucketScheme {
    fn default() -> Self {
        Self {
            edges: DEFAULT_BUCKET_EDGES.to_vec(),
            labels: DEFAULT_BUCKET_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl BucketScheme {
    pub fn new(edges: Vec<f64>, labels: Vec<String>) -> Result<Self> {
        let scheme = Self { edges, labels };
        scheme.validate()?;
        Ok(scheme)
    }

    /// Check edge monotonicity and edge/label agreement
    pub fn validate(&self) -> Result<()> {
        if self.edges.is_empty() {
            return Err(EnsembleError::DataIntegrity(
                "bucket scheme has no edges".to_string(),
            ));
        }
        if self.edges.len() != self.labels.len() {
            return Err(EnsembleError::DataIntegrity(format!(
                "bucket scheme has {} edges but {} labels",
                self.edges.len(),
                self.labels.len()
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err(EnsembleError::DataIntegrity(
                "bucket edges must be finite; the last bucket is open-ended".to_string(),
            ));
        }
        if self.edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EnsembleError::DataIntegrity(format!(
                "bucket edges must be strictly increasing: {:?}",
                self.edges
            )));
        }
        let mut seen = HashSet::with_capacity(self.labels.len());
        if let Some(dup) = self.labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(EnsembleError::DataIntegrity(format!("duplicate bucket label '{}'", dup)));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Bucket index for a magnitude, or None below the first edge or for NaN.
    /// A value equal to an edge belongs to the bucket that edge opens.
    pub fn bucketize(&self, value: f64) -> Option<usize> {
        if value.is_nan() || value < self.edges[0] {
            return None;
        }
        Some(self.edges.partition_point(|edge| *edge <= value) - 1)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }
}

/// Canonical input/output contract shared by the three models of a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub feature_names: Vec<String>,
    pub buckets: BucketScheme,
    pub version: String,
}

impl FeatureSchema {
    pub fn new(feature_names: Vec<String>, buckets: BucketScheme, version: impl Into<String>) -> Result<Self> {
        let schema = Self {
            feature_names,
            buckets,
            version: version.into(),
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(EnsembleError::ArtifactMismatch(format!(
                    "duplicate feature name '{}' in schema {}",
                    name, self.version
                )));
            }
        }
        self.buckets
            .validate()
            .map_err(|e| EnsembleError::ArtifactMismatch(e.to_string()))
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn bucket_labels(&self) -> &[String] {
        &self.buckets.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_value_maps_to_upper_bucket() {
        let scheme = BucketScheme::default();
        assert_eq!(scheme.bucketize(1.0), Some(2));
        assert_eq!(scheme.label(2), Some("1-1.5R"));
        assert_eq!(scheme.bucketize(0.0), Some(0));
        assert_eq!(scheme.bucketize(0.5), Some(1));
        assert_eq!(scheme.bucketize(2.0), Some(4));
    }

    #[test]
    fn test_last_bucket_is_open_ended() {
        let scheme = BucketScheme::default();
        assert_eq!(scheme.bucketize(1_000_000.0), Some(4));
        assert_eq!(scheme.bucketize(f64::INFINITY), Some(4));
    }

    #[test]
    fn test_bucketize_partitions_non_negative_values() {
        let scheme = BucketScheme::default();
        let mut value = 0.0;
        while value < 5.0 {
            let idx = scheme.bucketize(value).unwrap();
            let lower = scheme.edges[idx];
            let upper = scheme.edges.get(idx + 1).copied().unwrap_or(f64::INFINITY);
            assert!(value >= lower && value < upper, "{} not in [{}, {})", value, lower, upper);
            value += 0.05;
        }
    }

    #[test]
    fn test_out_of_range_values() {
        let scheme = BucketScheme::default();
        assert_eq!(scheme.bucketize(-0.1), None);
        assert_eq!(scheme.bucketize(f64::NAN), None);
    }

    #[test]
    fn test_scheme_validation() {
        assert!(BucketScheme::default().validate().is_ok());
        assert!(BucketScheme::new(vec![0.0, 1.0], vec!["a".into()]).is_err());
        assert!(BucketScheme::new(vec![0.0, 0.0], vec!["a".into(), "b".into()]).is_err());
        assert!(BucketScheme::new(vec![], vec![]).is_err());
        assert!(BucketScheme::new(vec![0.0, f64::INFINITY], vec!["a".into(), "b".into()]).is_err());
    }

    #[test]
    fn test_scheme_rejects_duplicate_labels() {
        let result = BucketScheme::new(
            vec![0.0, 1.0, 2.0],
            vec!["low".into(), "high".into(), "low".into()],
        );
        assert!(matches!(result, Err(EnsembleError::DataIntegrity(msg)) if msg.contains("low")));
    }

    #[test]
    fn test_schema_rejects_duplicate_names() {
        let result = FeatureSchema::new(
            vec!["rsi".into(), "atr".into(), "rsi".into()],
            BucketScheme::default(),
            "v1.0",
        );
        assert!(matches!(result, Err(EnsembleError::ArtifactMismatch(_))));
    }
}
