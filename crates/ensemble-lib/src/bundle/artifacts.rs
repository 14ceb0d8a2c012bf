//! On-disk bundle layout
//!
//! ```text
//! <root>/CURRENT                      published version label
//! <root>/versions/<version>/
//!     win_classifier.json
//!     bucket_classifier.json
//!     mfe_regressor.json
//!     win_classifier_meta.json
//!     bucket_mfe_meta.json
//!     manifest.json                   checksums, metrics, trained_at
//! ```
//!
//! A version directory is assembled under a staging name and renamed into
//! place; `CURRENT` is replaced last, so readers only ever see complete
//! versions.

use super::ModelBundle;
use crate::error::{EnsembleError, Result};
use crate::forest::{ForestRegressor, ProbabilityForest};
use crate::models::{ClassBalance, TrainingMetrics};
use crate::schema::{BucketScheme, FeatureSchema};
use crate::training::TrainedBundle;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const WIN_MODEL_FILE: &str = "win_classifier.json";
pub const BUCKET_MODEL_FILE: &str = "bucket_classifier.json";
pub const MFE_MODEL_FILE: &str = "mfe_regressor.json";
pub const WIN_META_FILE: &str = "win_classifier_meta.json";
pub const BUCKET_META_FILE: &str = "bucket_mfe_meta.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CURRENT_FILE: &str = "CURRENT";
pub const VERSIONS_DIR: &str = "versions";

const STAGING_PREFIX: &str = ".staging-";

/// Files covered by manifest checksums
const CHECKSUMMED_FILES: [&str; 5] = [
    WIN_MODEL_FILE,
    BUCKET_MODEL_FILE,
    MFE_MODEL_FILE,
    WIN_META_FILE,
    BUCKET_META_FILE,
];

/// Metadata for the win/loss classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinModelMeta {
    pub features: Vec<String>,
    pub n_features: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub class_balance: ClassBalance,
    pub scale_pos_weight: f64,
    pub version: String,
}

/// Metadata shared by the bucket classifier and the MFE regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketModelMeta {
    pub features: Vec<String>,
    pub n_features: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub mfe_bucket_edges: Vec<f64>,
    pub mfe_bucket_labels: Vec<String>,
    #[serde(default)]
    pub bucket_counts: Vec<usize>,
    pub version: String,
}

/// Per-version record of what was published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    /// File name -> SHA-256 hex digest
    pub checksums: BTreeMap<String, String>,
    pub metrics: TrainingMetrics,
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn mismatch(version: &str, detail: impl std::fmt::Display) -> EnsembleError {
    EnsembleError::ArtifactMismatch(format!("bundle {}: {}", version, detail))
}

/// Published bundles under one models directory
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(VERSIONS_DIR).join(version)
    }

    /// The published version label, or `None` before the first publish
    pub fn current_version(&self) -> Result<Option<String>> {
        let path = self.current_path();
        match fs::read_to_string(&path) {
            Ok(content) => {
                let version = content.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EnsembleError::io(path, e)),
        }
    }

    /// Published version labels, sorted
    pub fn list_versions(&self) -> Result<Vec<String>> {
        let dir = self.root.join(VERSIONS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EnsembleError::io(dir, e)),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EnsembleError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() && !name.starts_with(STAGING_PREFIX) {
                versions.push(name);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Write a trained bundle as a new version and point `CURRENT` at it
    pub fn publish(&self, trained: &TrainedBundle) -> Result<Manifest> {
        let version = trained.version();
        validate_version_label(version)?;

        let final_dir = self.version_dir(version);
        if final_dir.exists() {
            return Err(EnsembleError::Config(format!(
                "version {} is already published at {}",
                version,
                final_dir.display()
            )));
        }

        let versions_dir = self.root.join(VERSIONS_DIR);
        fs::create_dir_all(&versions_dir).map_err(|e| EnsembleError::io(&versions_dir, e))?;
        let staging = versions_dir.join(format!("{}{}", STAGING_PREFIX, version));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| EnsembleError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| EnsembleError::io(&staging, e))?;

        let manifest = match self.write_staging(&staging, trained) {
            Ok(manifest) => manifest,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
                }
                return Err(e);
            }
        };

        fs::rename(&staging, &final_dir).map_err(|e| EnsembleError::io(&final_dir, e))?;
        self.write_current(version)?;

        info!(
            version = %version,
            path = %final_dir.display(),
            "Published bundle"
        );
        Ok(manifest)
    }

    fn write_staging(&self, staging: &Path, trained: &TrainedBundle) -> Result<Manifest> {
        trained.win_model.save(&staging.join(WIN_MODEL_FILE))?;
        trained.bucket_model.save(&staging.join(BUCKET_MODEL_FILE))?;
        trained.mfe_model.save(&staging.join(MFE_MODEL_FILE))?;
        write_json(&staging.join(WIN_META_FILE), &trained.win_meta)?;
        write_json(&staging.join(BUCKET_META_FILE), &trained.bucket_meta)?;

        let mut checksums = BTreeMap::new();
        for name in CHECKSUMMED_FILES {
            let path = staging.join(name);
            let bytes = fs::read(&path).map_err(|e| EnsembleError::io(&path, e))?;
            checksums.insert(name.to_string(), compute_checksum(&bytes));
        }

        let manifest = Manifest {
            version: trained.version().to_string(),
            trained_at: Utc::now(),
            checksums,
            metrics: trained.metrics.clone(),
        };
        write_json(&staging.join(MANIFEST_FILE), &manifest)?;
        Ok(manifest)
    }

    /// Replace the pointer file via temp file + rename
    fn write_current(&self, version: &str) -> Result<()> {
        let path = self.current_path();
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| EnsembleError::io(&temp_path, e))?;
        file.write_all(version.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| EnsembleError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| EnsembleError::io(&path, e))?;
        debug!(version = %version, "Updated CURRENT pointer");
        Ok(())
    }

    pub fn read_manifest(&self, version: &str) -> Result<Manifest> {
        read_json(&self.version_dir(version).join(MANIFEST_FILE))
    }

    /// Load the version named by `CURRENT`
    pub fn load_current(&self) -> Result<ModelBundle> {
        let version = self.current_version()?.ok_or(EnsembleError::NotReady)?;
        self.load_version(&version)
    }

    /// Load and cross-check one published version. Any inconsistency between
    /// the artifacts is reported as `ArtifactMismatch`.
    pub fn load_version(&self, version: &str) -> Result<ModelBundle> {
        validate_version_label(version)?;
        let dir = self.version_dir(version);
        if !dir.is_dir() {
            return Err(mismatch(version, format!("{} does not exist", dir.display())));
        }

        let manifest: Manifest = read_json(&dir.join(MANIFEST_FILE)).map_err(|e| mismatch(version, e))?;
        if manifest.version != version {
            return Err(mismatch(
                version,
                format!("manifest carries version {}", manifest.version),
            ));
        }
        for name in CHECKSUMMED_FILES {
            let path = dir.join(name);
            let bytes = fs::read(&path).map_err(|e| mismatch(version, EnsembleError::io(&path, e)))?;
            let expected = manifest
                .checksums
                .get(name)
                .ok_or_else(|| mismatch(version, format!("manifest has no checksum for {}", name)))?;
            let actual = compute_checksum(&bytes);
            if &actual != expected {
                return Err(mismatch(
                    version,
                    format!("checksum mismatch for {}: expected {}, got {}", name, expected, actual),
                ));
            }
        }

        let win_meta: WinModelMeta = read_json(&dir.join(WIN_META_FILE)).map_err(|e| mismatch(version, e))?;
        let bucket_meta: BucketModelMeta =
            read_json(&dir.join(BUCKET_META_FILE)).map_err(|e| mismatch(version, e))?;

        if win_meta.version != version || bucket_meta.version != version {
            return Err(mismatch(
                version,
                format!(
                    "metadata versions disagree: win={}, bucket={}",
                    win_meta.version, bucket_meta.version
                ),
            ));
        }
        if win_meta.features != bucket_meta.features {
            return Err(mismatch(version, "metadata documents list different feature names"));
        }
        if win_meta.n_features != win_meta.features.len() || bucket_meta.n_features != bucket_meta.features.len() {
            return Err(mismatch(version, "n_features does not match the feature list"));
        }

        let buckets = BucketScheme::new(bucket_meta.mfe_bucket_edges, bucket_meta.mfe_bucket_labels)
            .map_err(|e| mismatch(version, e))?;
        let schema = FeatureSchema::new(win_meta.features, buckets, version).map_err(|e| mismatch(version, e))?;

        let win_model = ProbabilityForest::load(&dir.join(WIN_MODEL_FILE)).map_err(|e| mismatch(version, e))?;
        let bucket_model =
            ProbabilityForest::load(&dir.join(BUCKET_MODEL_FILE)).map_err(|e| mismatch(version, e))?;
        let mfe_model = ForestRegressor::load(&dir.join(MFE_MODEL_FILE)).map_err(|e| mismatch(version, e))?;

        let bundle = ModelBundle::new(
            schema,
            Box::new(win_model),
            Box::new(bucket_model),
            Box::new(mfe_model),
            Some(manifest.metrics),
        )?;
        debug!(version = %version, n_features = bundle.schema().n_features(), "Loaded bundle artifacts");
        Ok(bundle)
    }
}

/// Version labels become directory names; keep them to one path component
fn validate_version_label(version: &str) -> Result<()> {
    if version.is_empty()
        || version.starts_with('.')
        || version.contains(['/', '\\'])
        || version.chars().any(char::is_whitespace)
    {
        return Err(EnsembleError::Config(format!("invalid version label '{}'", version)));
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).map_err(|e| EnsembleError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
