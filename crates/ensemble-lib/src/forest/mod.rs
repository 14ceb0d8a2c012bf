//! Tree-ensemble engine backed by smartcore random forests
//!
//! Classifiers are probability forests: one regression forest per class
//! column, fit on 0/1 indicator targets, so every leaf averages class
//! frequencies. Sample weights are applied as a seeded weighted bootstrap
//! before fitting. Models serialize to JSON.
//!
//! The ensemble predictor only sees the [`Classifier`] and [`Regressor`]
//! traits, so any engine producing per-row probabilities or estimates can
//! back a bundle.

mod classifier;
mod params;
mod regressor;

pub use classifier::ProbabilityForest;
pub use params::ForestParams;
pub use regressor::ForestRegressor;

use crate::error::{EnsembleError, Result};
use ndarray::{ArrayView1, ArrayView2};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt::Display;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Stand-in for NaN inputs. It sorts below every observed value, so missing
/// values share one side of each split.
pub const MISSING_VALUE: f64 = -1.0e9;

/// Probabilistic classifier over one feature row
pub trait Classifier: Send + Sync {
    /// Probability per class, in class-index order
    fn predict_proba(&self, row: ArrayView1<f32>) -> Result<Vec<f32>>;

    /// Expected input width
    fn num_features(&self) -> usize;

    /// Number of classes the model was configured with
    fn num_classes(&self) -> usize;
}

/// Continuous estimator over one feature row
pub trait Regressor: Send + Sync {
    fn predict(&self, row: ArrayView1<f32>) -> Result<f32>;

    /// Expected input width
    fn num_features(&self) -> usize;
}

/// Index of the maximum; ties resolve to the lowest index
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn engine_error(context: &str, e: impl Display) -> EnsembleError {
    EnsembleError::Engine(format!("{}: {}", context, e))
}

fn encode(value: f32) -> f64 {
    if value.is_nan() {
        MISSING_VALUE
    } else {
        value as f64
    }
}

/// Selected rows of `x` as an engine matrix
fn dense_rows(x: ArrayView2<f32>, rows: &[usize]) -> Result<DenseMatrix<f64>> {
    let data: Vec<Vec<f64>> = rows
        .iter()
        .map(|&i| x.row(i).iter().map(|&v| encode(v)).collect())
        .collect();
    DenseMatrix::from_2d_vec(&data).map_err(|e| engine_error("building feature matrix", e))
}

fn dense_row(row: ArrayView1<f32>) -> Result<DenseMatrix<f64>> {
    let data = vec![row.iter().map(|&v| encode(v)).collect::<Vec<f64>>()];
    DenseMatrix::from_2d_vec(&data).map_err(|e| engine_error("building feature row", e))
}

fn predict_one(forest: &Forest, input: &DenseMatrix<f64>) -> Result<f64> {
    let predictions = forest.predict(input).map_err(|e| engine_error("forest prediction", e))?;
    predictions
        .first()
        .copied()
        .ok_or_else(|| EnsembleError::Engine("forest returned no prediction".to_string()))
}

fn check_shape(x: ArrayView2<f32>, n_targets: usize, sample_weight: Option<&[f32]>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(EnsembleError::DataIntegrity("cannot fit on zero rows".to_string()));
    }
    if x.ncols() == 0 {
        return Err(EnsembleError::DataIntegrity("cannot fit without features".to_string()));
    }
    if n_targets != x.nrows() {
        return Err(EnsembleError::DataIntegrity(format!(
            "target count {} does not match row count {}",
            n_targets,
            x.nrows()
        )));
    }
    if let Some(w) = sample_weight {
        if w.len() != x.nrows() {
            return Err(EnsembleError::DataIntegrity(format!(
                "weight count {} does not match row count {}",
                w.len(),
                x.nrows()
            )));
        }
    }
    Ok(())
}

/// Row indices to fit on. Unweighted fits use every row once; weighted fits
/// draw `n` rows with probability proportional to weight. All-zero weights
/// carry no relative information and count as unweighted.
fn bootstrap_rows(n: usize, sample_weight: Option<&[f32]>, seed: u64) -> Result<Vec<usize>> {
    let Some(weights) = sample_weight.filter(|w| w.iter().any(|&v| v != 0.0)) else {
        return Ok((0..n).collect());
    };
    let dist = WeightedIndex::new(weights.iter().map(|&w| w as f64))
        .map_err(|e| EnsembleError::DataIntegrity(format!("invalid sample weights: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows: Vec<usize> = (0..n).map(|_| dist.sample(&mut rng)).collect();
    rows.sort_unstable();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_prefers_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1]), 0);
    }

    #[test]
    fn test_unweighted_bootstrap_keeps_every_row() {
        assert_eq!(bootstrap_rows(4, None, 7).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_weighted_bootstrap_follows_weights() {
        let rows = bootstrap_rows(200, Some(&[0.0, 1.0, 0.0, 3.0]), 7).unwrap();
        assert_eq!(rows.len(), 200);
        assert!(rows.iter().all(|&r| r == 1 || r == 3));
        let heavy = rows.iter().filter(|&&r| r == 3).count();
        assert!(heavy > 100, "row 3 drawn {} times", heavy);

        // seeded: same draw every time
        assert_eq!(rows, bootstrap_rows(200, Some(&[0.0, 1.0, 0.0, 3.0]), 7).unwrap());
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_every_row() {
        assert_eq!(bootstrap_rows(3, Some(&[0.0, 0.0, 0.0]), 1).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        for weights in [[1.0, -1.0], [f32::NAN, 1.0]] {
            let result = bootstrap_rows(2, Some(&weights), 1);
            assert!(matches!(result, Err(EnsembleError::DataIntegrity(_))), "{:?}", weights);
        }
    }

    #[test]
    fn test_missing_values_are_encoded() {
        assert_eq!(encode(f32::NAN), MISSING_VALUE);
        assert_eq!(encode(1.5), 1.5);
    }
}
