//! Forest hyperparameters

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressorParameters;

/// Hyperparameters shared by every forest a model fits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Features tried per split; the engine default when unset
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 8,
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.n_trees == 0 || self.max_depth == 0 {
            return Err(EnsembleError::Config(format!(
                "{} needs at least one tree and a positive max_depth",
                name
            )));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(EnsembleError::Config(format!(
                "{} needs min_samples_leaf >= 1 and min_samples_split >= 2",
                name
            )));
        }
        if self.max_features == Some(0) {
            return Err(EnsembleError::Config(format!("{} max_features must be positive", name)));
        }
        Ok(())
    }

    /// Engine parameters for one forest; `offset` decorrelates the forests
    /// of a multi-column model
    pub(super) fn engine_params(&self, offset: u64) -> RandomForestRegressorParameters {
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_min_samples_split(self.min_samples_split)
            .with_seed(self.seed.wrapping_add(offset));
        match self.max_features {
            Some(m) => params.with_m(m),
            None => params,
        }
    }
}
