//! Raw training tables and dataset preparation
//!
//! `DatasetPreparer` turns labeled rows into a numeric matrix plus the three
//! targets:
//! - keep only win/loss rows
//! - drop columns that are almost entirely missing in this run
//! - drop identifier columns and anything downstream of the outcome
//! - one-hot encode categoricals ("unknown" for missing), booleans to 0/1
//! - bucketize the MFE target and split chronologically

use super::config::TrainingConfig;
use crate::error::{EnsembleError, Result};
use crate::models::Outcome;
use csv::{ReaderBuilder, Writer};
use ndarray::{s, Array2, ArrayView2};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Category substituted for missing categorical values
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Tokens read as missing, besides the empty string
const NULL_TOKENS: &[&str] = &["NaN", "nan", "NULL", "null", "None", "NA", "N/A", "n/a", "<NA>"];

/// One cell of a raw training table
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl RawValue {
    /// Parse a CSV cell: null tokens, booleans, numbers, then free text
    pub fn parse(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed) {
            return RawValue::Missing;
        }
        match trimmed {
            "true" | "True" | "TRUE" => return RawValue::Bool(true),
            "false" | "False" | "FALSE" => return RawValue::Bool(false),
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => RawValue::Missing,
            Ok(v) => RawValue::Number(v),
            Err(_) => RawValue::Text(cell.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => Some(*v),
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// String form used as a one-hot category
    fn category(&self) -> String {
        match self {
            RawValue::Missing => UNKNOWN_CATEGORY.to_string(),
            RawValue::Number(v) if v.fract() == 0.0 && v.is_finite() => format!("{:.1}", v),
            RawValue::Number(v) => v.to_string(),
            RawValue::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            RawValue::Text(t) => t.clone(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Missing => Ok(()),
            RawValue::Number(v) => write!(f, "{}", v),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Text(t) => write!(f, "{}", t),
        }
    }
}

/// Column-ordered table of heterogeneous rows, assumed sorted by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EnsembleError::DataIntegrity(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns);
        for record in csv.records() {
            let record = record?;
            table.push_row(record.iter().map(RawValue::parse).collect())?;
        }
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EnsembleError::io(path, e))?;
        let table = Self::from_reader(file)?;
        debug!(path = %path.display(), rows = table.len(), columns = table.columns.len(), "Loaded raw table");
        Ok(table)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(row.iter().map(|v| v.to_string()))?;
        }
        csv.flush().map_err(|e| EnsembleError::io("<csv writer>", e))?;
        Ok(())
    }

    pub fn write_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| EnsembleError::io(path, e))?;
        self.write_to(file)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&RawValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }
}

/// Why each dropped column was removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DroppedColumns {
    pub sparse: Vec<String>,
    pub excluded: Vec<String>,
    pub free_text: Vec<String>,
}

/// Model-ready matrix, targets and chronological split point
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f32>,
    /// 1.0 for win, 0.0 for loss
    pub binary_target: Vec<f32>,
    pub bucket_target: Vec<usize>,
    pub mfe_target: Vec<f32>,
    /// Rows before this index train; the rest evaluate
    pub split_index: usize,
    pub dropped: DroppedColumns,
}

impl PreparedDataset {
    pub fn len(&self) -> usize {
        self.binary_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binary_target.is_empty()
    }

    pub fn train_size(&self) -> usize {
        self.split_index
    }

    pub fn test_size(&self) -> usize {
        self.len() - self.split_index
    }

    pub fn train_features(&self) -> ArrayView2<'_, f32> {
        self.features.slice(s![..self.split_index, ..])
    }

    pub fn test_features(&self) -> ArrayView2<'_, f32> {
        self.features.slice(s![self.split_index.., ..])
    }

    pub fn train_binary(&self) -> &[f32] {
        &self.binary_target[..self.split_index]
    }

    pub fn test_binary(&self) -> &[f32] {
        &self.binary_target[self.split_index..]
    }

    pub fn train_buckets(&self) -> &[usize] {
        &self.bucket_target[..self.split_index]
    }

    pub fn test_buckets(&self) -> &[usize] {
        &self.bucket_target[self.split_index..]
    }

    pub fn train_mfe(&self) -> &[f32] {
        &self.mfe_target[..self.split_index]
    }

    pub fn test_mfe(&self) -> &[f32] {
        &self.mfe_target[self.split_index..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Numeric,
    Text,
}

/// One output column of the feature matrix
enum FeatureSource {
    Value(usize),
    Category { column: usize, category: String },
}

/// Transforms raw labeled rows into a `PreparedDataset`
pub struct DatasetPreparer<'a> {
    config: &'a TrainingConfig,
}

impl<'a> DatasetPreparer<'a> {
    pub fn new(config: &'a TrainingConfig) -> Self {
        Self { config }
    }

    pub fn prepare(&self, table: &RawTable) -> Result<PreparedDataset> {
        let config = self.config;
        config.buckets.validate()?;

        let outcome_idx = table.column_index(&config.outcome_column).ok_or_else(|| {
            EnsembleError::DataIntegrity(format!("missing outcome column '{}'", config.outcome_column))
        })?;
        let mfe_idx = table.column_index(&config.mfe_column).ok_or_else(|| {
            EnsembleError::DataIntegrity(format!("missing MFE column '{}'", config.mfe_column))
        })?;

        let rows: Vec<(&Vec<RawValue>, Outcome)> = table
            .rows()
            .iter()
            .filter_map(|row| {
                let outcome = match &row[outcome_idx] {
                    RawValue::Text(t) => t.parse::<Outcome>().unwrap_or(Outcome::Other),
                    _ => Outcome::Other,
                };
                outcome.is_trainable().then_some((row, outcome))
            })
            .collect();

        if rows.is_empty() {
            return Err(EnsembleError::DataIntegrity(
                "no win/loss rows after outcome filtering".to_string(),
            ));
        }

        let n = rows.len();
        let split_index = (n as f64 * config.train_fraction).floor() as usize;
        if split_index == 0 || split_index == n {
            return Err(EnsembleError::DataIntegrity(format!(
                "{} trainable rows cannot form both a train and a test partition",
                n
            )));
        }

        let binary_target: Vec<f32> = rows
            .iter()
            .map(|(_, o)| if *o == Outcome::Win { 1.0 } else { 0.0 })
            .collect();

        let mut bucket_target = Vec::with_capacity(n);
        let mut mfe_target = Vec::with_capacity(n);
        for (i, (row, _)) in rows.iter().enumerate() {
            let mfe = row[mfe_idx].as_f64().ok_or_else(|| {
                EnsembleError::DataIntegrity(format!("row {} has no numeric MFE value", i))
            })?;
            let bucket = config.buckets.bucketize(mfe).ok_or_else(|| {
                EnsembleError::DataIntegrity(format!(
                    "row {} MFE {} is below the first bucket edge {}",
                    i, mfe, config.buckets.edges[0]
                ))
            })?;
            bucket_target.push(bucket);
            mfe_target.push(mfe as f32);
        }

        if let Some(time) = &config.time_column {
            if let Some(idx) = table.column_index(time) {
                self.check_time_order(&rows, idx, time);
            }
        }

        let (sources, feature_names, dropped) = self.plan_columns(table, &rows);

        let mut features = Array2::<f32>::from_elem((n, sources.len()), f32::NAN);
        for (r, (row, _)) in rows.iter().enumerate() {
            for (c, source) in sources.iter().enumerate() {
                features[[r, c]] = match source {
                    FeatureSource::Value(col) => row[*col].as_f64().map_or(f32::NAN, |v| v as f32),
                    FeatureSource::Category { column, category } => {
                        if row[*column].category() == *category {
                            1.0
                        } else {
                            0.0
                        }
                    }
                };
            }
        }

        info!(
            rows = n,
            train = split_index,
            test = n - split_index,
            features = feature_names.len(),
            sparse_dropped = dropped.sparse.len(),
            text_dropped = dropped.free_text.len(),
            "Prepared training dataset"
        );

        Ok(PreparedDataset {
            feature_names,
            features,
            binary_target,
            bucket_target,
            mfe_target,
            split_index,
            dropped,
        })
    }

    /// Decide which input columns survive and in what order they appear
    fn plan_columns(
        &self,
        table: &RawTable,
        rows: &[(&Vec<RawValue>, Outcome)],
    ) -> (Vec<FeatureSource>, Vec<String>, DroppedColumns) {
        let config = self.config;
        let n = rows.len() as f64;
        let excluded: HashSet<&str> = config.excluded_columns().into_iter().collect();
        let categorical: HashSet<&str> = config.categorical_columns.iter().map(String::as_str).collect();

        let mut dropped = DroppedColumns::default();
        let mut sources = Vec::new();
        let mut names = Vec::new();
        let mut kept_categoricals = Vec::new();

        for (idx, column) in table.columns().iter().enumerate() {
            let missing = rows.iter().filter(|(row, _)| row[idx].is_missing()).count() as f64;
            if missing / n > config.max_null_fraction {
                dropped.sparse.push(column.clone());
                continue;
            }
            if excluded.contains(column.as_str()) {
                dropped.excluded.push(column.clone());
                continue;
            }
            if categorical.contains(column.as_str()) {
                kept_categoricals.push((column.clone(), idx));
                continue;
            }
            match Self::column_kind(rows, idx) {
                ColumnKind::Numeric => {
                    sources.push(FeatureSource::Value(idx));
                    names.push(column.clone());
                }
                ColumnKind::Text => {
                    warn!(column = %column, "Dropping non-numeric column not listed as categorical");
                    dropped.free_text.push(column.clone());
                }
            }
        }

        // dummies follow the configured categorical order, categories sorted
        for wanted in &config.categorical_columns {
            let Some((column, idx)) = kept_categoricals.iter().find(|(c, _)| c == wanted) else {
                continue;
            };
            let categories: BTreeSet<String> = rows.iter().map(|(row, _)| row[*idx].category()).collect();
            for category in categories {
                names.push(format!("{}_{}", column, category));
                sources.push(FeatureSource::Category {
                    column: *idx,
                    category,
                });
            }
        }

        if !dropped.sparse.is_empty() {
            debug!(columns = ?dropped.sparse, "Dropped sparse columns");
        }
        (sources, names, dropped)
    }

    fn column_kind(rows: &[(&Vec<RawValue>, Outcome)], idx: usize) -> ColumnKind {
        if rows.iter().any(|(row, _)| matches!(row[idx], RawValue::Text(_))) {
            ColumnKind::Text
        } else {
            ColumnKind::Numeric
        }
    }

    fn check_time_order(&self, rows: &[(&Vec<RawValue>, Outcome)], idx: usize, column: &str) {
        let mut last: Option<&RawValue> = None;
        for (i, (row, _)) in rows.iter().enumerate() {
            let current = &row[idx];
            if current.is_missing() {
                continue;
            }
            if let Some(prev) = last {
                let out_of_order = match (prev, current) {
                    (RawValue::Number(a), RawValue::Number(b)) => b < a,
                    (RawValue::Text(a), RawValue::Text(b)) => b < a,
                    _ => false,
                };
                if out_of_order {
                    warn!(column = %column, row = i, "Rows are not sorted by time; the split may leak future data");
                    return;
                }
            }
            last = Some(current);
        }
    }
}
