//! Random forest regressor

use super::{
    bootstrap_rows, check_shape, dense_row, dense_rows, engine_error, predict_one, Forest, ForestParams,
    Regressor,
};
use crate::error::{EnsembleError, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Mean of the tree estimates; output is unbounded
#[derive(Serialize, Deserialize)]
pub struct ForestRegressor {
    num_features: usize,
    forest: Forest,
}

impl fmt::Debug for ForestRegressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForestRegressor")
            .field("num_features", &self.num_features)
            .finish()
    }
}

impl ForestRegressor {
    pub fn fit(
        params: &ForestParams,
        x: ArrayView2<f32>,
        y: &[f32],
        sample_weight: Option<&[f32]>,
    ) -> Result<Self> {
        check_shape(x, y.len(), sample_weight)?;
        if let Some(bad) = y.iter().find(|v| !v.is_finite()) {
            return Err(EnsembleError::DataIntegrity(format!(
                "regression target must be finite, got {}",
                bad
            )));
        }

        let rows = bootstrap_rows(x.nrows(), sample_weight, params.seed)?;
        let matrix = dense_rows(x, &rows)?;
        let target: Vec<f64> = rows.iter().map(|&i| y[i] as f64).collect();
        let forest = Forest::fit(&matrix, &target, params.engine_params(0))
            .map_err(|e| engine_error("fitting regression forest", e))?;

        debug!(rows = rows.len(), n_trees = params.n_trees, "Fitted regression forest");
        Ok(Self {
            num_features: x.ncols(),
            forest,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        if model.num_features == 0 {
            return Err(EnsembleError::ArtifactMismatch(
                "regressor declares zero input features".to_string(),
            ));
        }
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|e| EnsembleError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e))?;
        Self::from_json(&json)
    }
}

impl Regressor for ForestRegressor {
    fn predict(&self, row: ArrayView1<f32>) -> Result<f32> {
        let input = dense_row(row)?;
        Ok(predict_one(&self.forest, &input)? as f32)
    }

    fn num_features(&self) -> usize {
        self.num_features
    }
}
