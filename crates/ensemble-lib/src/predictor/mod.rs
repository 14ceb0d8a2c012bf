//! Serving-side prediction: feature alignment, ensemble scoring and output
//! formatting

mod features;
mod inference;
mod output;

pub use features::{parse_feature_batch, parse_feature_map, FeatureVector, FeatureVectorBuilder};
pub use inference::{BatchPrediction, EnsemblePredictor, DEFAULT_MAX_BATCH_SIZE};
pub use output::{OutputFormatter, WIN_CLASS_INDEX};
