//! Union of historical outcomes and resolved live signals
//!
//! Historical rows define the column template. Signal rows carry a JSON
//! `feature_vector` snapshot which is flattened over the signal's own columns
//! before alignment: template columns the signal lacks become missing, signal
//! columns outside the template are dropped.

use super::dataset::{RawTable, RawValue};
use crate::error::{EnsembleError, Result};
use crate::models::Outcome;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Signal column holding the JSON feature snapshot
pub const FEATURE_VECTOR_COLUMN: &str = "feature_vector";

/// Row counts contributed by each source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnionSummary {
    pub historical_rows: usize,
    pub signal_rows: usize,
    pub skipped_signals: usize,
}

impl UnionSummary {
    pub fn total(&self) -> usize {
        self.historical_rows + self.signal_rows
    }
}

fn json_to_raw(value: &Value) -> RawValue {
    match value {
        Value::Null => RawValue::Missing,
        Value::Bool(b) => RawValue::Bool(*b),
        Value::Number(n) => n.as_f64().map_or(RawValue::Missing, RawValue::Number),
        Value::String(s) => RawValue::parse(s),
        other => RawValue::Text(other.to_string()),
    }
}

/// Flatten one signal row into column -> value, with snapshot keys taking
/// precedence over the row's own columns. `Ok(None)` when there is no
/// snapshot.
pub fn flatten_signal(columns: &[String], row: &[RawValue]) -> Result<Option<HashMap<String, RawValue>>> {
    let mut flat: HashMap<String, RawValue> = HashMap::with_capacity(columns.len());
    let mut snapshot = None;
    for (column, value) in columns.iter().zip(row) {
        if column == FEATURE_VECTOR_COLUMN {
            snapshot = Some(value);
        } else {
            flat.insert(column.clone(), value.clone());
        }
    }

    let text = match snapshot {
        None | Some(RawValue::Missing) => return Ok(None),
        Some(RawValue::Text(text)) => text,
        Some(other) => {
            return Err(EnsembleError::DataIntegrity(format!(
                "feature_vector must hold a JSON object, got '{}'",
                other
            )))
        }
    };

    let parsed: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = parsed else {
        return Err(EnsembleError::DataIntegrity(
            "feature_vector must hold a JSON object".to_string(),
        ));
    };
    for (key, value) in &fields {
        flat.insert(key.clone(), json_to_raw(value));
    }
    Ok(Some(flat))
}

fn is_trainable(value: Option<&RawValue>) -> bool {
    match value {
        Some(RawValue::Text(t)) => t.parse::<Outcome>().map_or(false, |o| o.is_trainable()),
        _ => false,
    }
}

/// Build one training table from both record sets. Only win/loss rows are
/// kept; historical rows come first, then signals, each in input order.
pub fn union_records(
    historical: &RawTable,
    signals: &RawTable,
    outcome_column: &str,
) -> Result<(RawTable, UnionSummary)> {
    let template: Vec<String> = historical.columns().to_vec();
    let outcome_idx = historical.column_index(outcome_column).ok_or_else(|| {
        EnsembleError::DataIntegrity(format!("historical records lack '{}' column", outcome_column))
    })?;

    let mut merged = RawTable::new(template.clone());
    let mut summary = UnionSummary::default();

    for row in historical.rows() {
        if is_trainable(row.get(outcome_idx)) {
            merged.push_row(row.clone())?;
            summary.historical_rows += 1;
        }
    }

    let dropped: Vec<&String> = signals
        .columns()
        .iter()
        .filter(|c| c.as_str() != FEATURE_VECTOR_COLUMN && !template.contains(*c))
        .collect();
    if !dropped.is_empty() {
        debug!(columns = ?dropped, "Signal columns outside the historical template are dropped");
    }

    for (i, row) in signals.rows().iter().enumerate() {
        let Some(mut flat) = flatten_signal(signals.columns(), row)? else {
            summary.skipped_signals += 1;
            continue;
        };
        if !is_trainable(flat.get(outcome_column)) {
            summary.skipped_signals += 1;
            continue;
        }
        let aligned: Vec<RawValue> = template
            .iter()
            .map(|column| flat.remove(column).unwrap_or(RawValue::Missing))
            .collect();
        merged.push_row(aligned)?;
        summary.signal_rows += 1;
        if i > 0 && i % 1000 == 0 {
            debug!(processed = i, "Flattening signals");
        }
    }

    if summary.skipped_signals > 0 {
        warn!(skipped = summary.skipped_signals, "Skipped signals without a snapshot or a win/loss outcome");
    }
    info!(
        historical = summary.historical_rows,
        signals = summary.signal_rows,
        total = summary.total(),
        "Merged training records"
    );
    Ok((merged, summary))
}
