//! Error taxonomy shared by the serving and training paths

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ensemble library
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// No bundle is loaded; retry after a deploy or reload
    #[error("models not loaded")]
    NotReady,

    /// Request payload does not have the expected structure
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Training data cannot produce a valid bundle; the run aborts before any fit
    #[error("training data integrity violation: {0}")]
    DataIntegrity(String),

    /// Persisted artifacts disagree with each other
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// The tree-ensemble engine failed to fit or score
    #[error("model engine error: {0}")]
    Engine(String),

    /// Training configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl EnsembleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the caller can recover by waiting for a bundle to load
    pub fn is_not_ready(&self) -> bool {
        matches!(self, EnsembleError::NotReady)
    }
}

pub type Result<T, E = EnsembleError> = std::result::Result<T, E>;
