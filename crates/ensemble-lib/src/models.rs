//! Core data models shared by serving and training

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Feature values keyed by name, as received from callers
pub type NamedValues = std::collections::HashMap<String, Option<f64>>;

/// Trade outcome recorded on a labeled row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Other,
}

impl Outcome {
    /// Only wins and losses are trainable
    pub fn is_trainable(&self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss)
    }
}

impl FromStr for Outcome {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "win" => Outcome::Win,
            "loss" => Outcome::Loss,
            _ => Outcome::Other,
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::Other => write!(f, "other"),
        }
    }
}

/// Combined output of the three models for one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub win_probability: f32,
    pub predicted_bucket: String,
    pub bucket_probabilities: BTreeMap<String, f32>,
    pub mfe_estimate: f32,
}

/// Train/test class counts for the binary model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassBalance {
    pub loss: usize,
    pub win: usize,
}

/// Held-out evaluation summary for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub version: String,
    pub training_size: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub n_features: usize,
    pub class_balance: ClassBalance,
    pub scale_pos_weight: f64,
    /// None when the evaluation partition holds a single class
    pub v1_auc: Option<f64>,
    pub v1_accuracy: f64,
    pub v2_accuracy: f64,
    pub v3_r2: f64,
    pub v3_mae: f64,
}
