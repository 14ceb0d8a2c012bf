//! Training run configuration

use crate::error::{EnsembleError, Result};
use crate::forest::ForestParams;
use crate::schema::BucketScheme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Columns one-hot encoded before training
pub const CATEGORICAL_COLUMNS: &[&str] = &[
    "pattern_type",
    "timeframe",
    "trend_state",
    "trading_session",
    "rsi_zone",
    "htf_d_trend_state",
    "htf_h4_trend_state",
    "htf_h1_trend_state",
];

/// Identifier and bookkeeping columns never used as features
pub const META_COLUMNS: &[&str] = &[
    "id",
    "pair",
    "start_timestamp",
    "end_timestamp",
    "entry_price",
    "stop_loss",
    "take_profit",
    "notes",
    "nearest_round_number",
    "nearest_support",
    "nearest_resistance",
];

/// Columns known only after the trade resolves; any of them in the feature
/// matrix leaks the label
pub const LEAKAGE_COLUMNS: &[&str] = &[
    "outcome",
    "r_multiple",
    "bars_to_outcome",
    "max_favorable_excursion",
    "quality_rating",
];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Configuration for dataset preparation and model fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub buckets: BucketScheme,
    /// Leading fraction of time-ordered rows used for training
    pub train_fraction: f64,
    /// Columns with a larger missing fraction are dropped
    pub max_null_fraction: f64,
    pub outcome_column: String,
    pub mfe_column: String,
    /// Checked for ascending order when present; never a feature
    pub time_column: Option<String>,
    pub categorical_columns: Vec<String>,
    pub meta_columns: Vec<String>,
    pub leakage_columns: Vec<String>,
    pub win_params: ForestParams,
    pub bucket_params: ForestParams,
    pub mfe_params: ForestParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            buckets: BucketScheme::default(),
            train_fraction: 0.8,
            max_null_fraction: 0.99,
            outcome_column: "outcome".to_string(),
            mfe_column: "max_favorable_excursion".to_string(),
            time_column: Some("end_timestamp".to_string()),
            categorical_columns: owned(CATEGORICAL_COLUMNS),
            meta_columns: owned(META_COLUMNS),
            leakage_columns: owned(LEAKAGE_COLUMNS),
            win_params: ForestParams::default(),
            bucket_params: ForestParams::default(),
            mfe_params: ForestParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Load from a JSON file; omitted fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.buckets.validate()?;
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(EnsembleError::Config(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.max_null_fraction) {
            return Err(EnsembleError::Config(format!(
                "max_null_fraction must be in [0, 1], got {}",
                self.max_null_fraction
            )));
        }
        for (name, params) in [
            ("win_params", &self.win_params),
            ("bucket_params", &self.bucket_params),
            ("mfe_params", &self.mfe_params),
        ] {
            params.validate(name)?;
        }
        Ok(())
    }

    /// Every column excluded before encoding: meta, leakage and both targets
    pub fn excluded_columns(&self) -> Vec<&str> {
        let mut excluded: Vec<&str> = self
            .meta_columns
            .iter()
            .chain(&self.leakage_columns)
            .map(String::as_str)
            .collect();
        excluded.push(&self.outcome_column);
        excluded.push(&self.mfe_column);
        if let Some(time) = &self.time_column {
            excluded.push(time);
        }
        excluded
    }
}
