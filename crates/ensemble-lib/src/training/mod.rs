//! Offline training pipeline: record union, dataset preparation, model
//! fitting and evaluation

mod config;
mod dataset;
mod export;
mod metrics;
mod trainer;
mod version;

pub use config::{TrainingConfig, CATEGORICAL_COLUMNS, LEAKAGE_COLUMNS, META_COLUMNS};
pub use dataset::{DatasetPreparer, DroppedColumns, PreparedDataset, RawTable, RawValue, UNKNOWN_CATEGORY};
pub use export::{flatten_signal, union_records, UnionSummary, FEATURE_VECTOR_COLUMN};
pub use metrics::{accuracy, mean_absolute_error, r2_score, roc_auc};
pub use trainer::{bucket_sample_weights, scale_pos_weight, ModelTrainer, TrainedBundle};
pub use version::{bump_version, INITIAL_VERSION};

#[cfg(test)]
pub(crate) use trainer::test_support;
