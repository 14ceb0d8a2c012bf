//! Named-value to feature-vector alignment
//!
//! Missing-value contract: a schema feature that is absent from the input,
//! or present as null, becomes NaN at its position. Unknown input keys are
//! ignored. The forests see NaN as a sentinel far below any real value, the
//! same encoding used during training, so absence of data degrades the
//! prediction instead of failing it.

use crate::error::{EnsembleError, Result};
use crate::models::NamedValues;
use crate::schema::FeatureSchema;
use ndarray::ArrayView1;
use serde_json::Value;
use std::collections::HashMap;

/// Fixed-length vector positionally aligned to a `FeatureSchema`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(&self.0[..])
    }

    /// Number of NaN positions
    pub fn missing_count(&self) -> usize {
        self.0.iter().filter(|v| v.is_nan()).count()
    }
}

/// Builds feature vectors in schema order
pub struct FeatureVectorBuilder<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> FeatureVectorBuilder<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// Never fails: output length is always `schema.n_features()`
    pub fn build(&self, named_values: &NamedValues) -> FeatureVector {
        let values = self
            .schema
            .feature_names
            .iter()
            .map(|name| match named_values.get(name) {
                Some(Some(v)) => *v as f32,
                _ => f32::NAN,
            })
            .collect();
        FeatureVector(values)
    }
}

/// Validate the shape of a JSON feature map.
///
/// Must be an object whose values are numbers, booleans (coerced to 0/1) or
/// null. Anything else is malformed input.
pub fn parse_feature_map(value: &Value) -> Result<NamedValues> {
    let object = value.as_object().ok_or_else(|| {
        EnsembleError::MalformedInput(format!(
            "feature map must be a JSON object, got {}",
            json_kind(value)
        ))
    })?;

    let mut named = HashMap::with_capacity(object.len());
    for (name, raw) in object {
        let parsed = match raw {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(n.as_f64().ok_or_else(|| {
                EnsembleError::MalformedInput(format!("feature '{}' is not representable as f64", name))
            })?),
            other => {
                return Err(EnsembleError::MalformedInput(format!(
                    "feature '{}' must be a number or null, got {}",
                    name,
                    json_kind(other)
                )))
            }
        };
        named.insert(name.clone(), parsed);
    }
    Ok(named)
}

/// Parse every item of a batch, failing on the first malformed one with its
/// index
pub fn parse_feature_batch(items: &[Value]) -> Result<Vec<NamedValues>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_feature_map(item).map_err(|e| match e {
                EnsembleError::MalformedInput(detail) => {
                    EnsembleError::MalformedInput(format!("item {}: {}", i, detail))
                }
                other => other,
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BucketScheme;
    use serde_json::json;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["rsi".into(), "atr".into(), "trend_state_up".into()],
            BucketScheme::default(),
            "v1.0",
        )
        .unwrap()
    }

    #[test]
    fn test_build_preserves_schema_order() {
        let schema = schema();
        let mut values = NamedValues::new();
        values.insert("trend_state_up".into(), Some(1.0));
        values.insert("rsi".into(), Some(55.5));
        values.insert("atr".into(), Some(0.0012));

        let vector = FeatureVectorBuilder::new(&schema).build(&values);
        assert_eq!(vector.values(), &[55.5, 0.0012, 1.0]);
    }

    #[test]
    fn test_missing_and_null_become_nan() {
        let schema = schema();
        let mut values = NamedValues::new();
        values.insert("atr".into(), None);
        values.insert("trend_state_up".into(), Some(0.0));

        let vector = FeatureVectorBuilder::new(&schema).build(&values);
        assert_eq!(vector.len(), 3);
        assert!(vector.values()[0].is_nan());
        assert!(vector.values()[1].is_nan());
        assert_eq!(vector.values()[2], 0.0);
        assert_eq!(vector.missing_count(), 2);
    }

    #[test]
    fn test_unknown_keys_ignored_for_every_subset() {
        let schema = schema();
        let full = [("rsi", 10.0), ("atr", 20.0), ("trend_state_up", 30.0)];
        // every subset of the schema keys, plus unknown extras
        for mask in 0u8..8 {
            let mut values = NamedValues::new();
            values.insert("not_a_feature".into(), Some(99.0));
            values.insert("another_extra".into(), None);
            for (i, (name, v)) in full.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    values.insert(name.to_string(), Some(*v));
                }
            }

            let vector = FeatureVectorBuilder::new(&schema).build(&values);
            assert_eq!(vector.len(), schema.n_features());
            for (i, (_, v)) in full.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    assert_eq!(vector.values()[i], *v as f32);
                } else {
                    assert!(vector.values()[i].is_nan());
                }
            }
        }
    }

    #[test]
    fn test_parse_feature_map_accepts_numbers_bools_and_null() {
        let parsed = parse_feature_map(&json!({"rsi": 41.2, "is_doji": true, "atr": null})).unwrap();
        assert_eq!(parsed["rsi"], Some(41.2));
        assert_eq!(parsed["is_doji"], Some(1.0));
        assert_eq!(parsed["atr"], None);
    }

    #[test]
    fn test_parse_feature_map_rejects_wrong_shapes() {
        assert!(matches!(
            parse_feature_map(&json!([1.0, 2.0])),
            Err(EnsembleError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_feature_map(&json!({"rsi": "high"})),
            Err(EnsembleError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_feature_map(&json!({"rsi": {"value": 1}})),
            Err(EnsembleError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_batch_parse_reports_failing_index() {
        let items = vec![json!({"rsi": 1.0}), json!({"rsi": 2.0}), json!("oops")];
        match parse_feature_batch(&items) {
            Err(EnsembleError::MalformedInput(detail)) => assert!(detail.starts_with("item 2:")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(parse_feature_batch(&items[..2]).unwrap().len(), 2);
    }
}
