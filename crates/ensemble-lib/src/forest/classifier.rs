//! Probability forest classifier

use super::{
    bootstrap_rows, check_shape, dense_row, dense_rows, engine_error, predict_one, Classifier, Forest,
    ForestParams,
};
use crate::error::{EnsembleError, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Class probabilities from one indicator forest per class column.
///
/// Binary models fit only the positive column and report `[1 - p, p]`. A
/// binary model that saw a single class reports one column holding all the
/// mass. Multiclass columns are normalized to sum to one.
#[derive(Serialize, Deserialize)]
pub struct ProbabilityForest {
    num_features: usize,
    num_classes: usize,
    /// Class indices present in the fitted rows, ascending
    classes: Vec<usize>,
    /// Fitted class frequencies, used when every column scores zero
    priors: Vec<f64>,
    /// `None` for a column with nothing to learn
    columns: Vec<Option<Forest>>,
}

impl fmt::Debug for ProbabilityForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbabilityForest")
            .field("num_features", &self.num_features)
            .field("num_classes", &self.num_classes)
            .field("classes", &self.classes)
            .finish()
    }
}

impl ProbabilityForest {
    /// Fit on a row-major matrix with class indices in `0..num_classes`
    pub fn fit(
        params: &ForestParams,
        x: ArrayView2<f32>,
        labels: &[usize],
        num_classes: usize,
        sample_weight: Option<&[f32]>,
    ) -> Result<Self> {
        if num_classes < 2 {
            return Err(EnsembleError::Config(format!(
                "a classifier needs at least two classes, got {}",
                num_classes
            )));
        }
        check_shape(x, labels.len(), sample_weight)?;
        if let Some(bad) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(EnsembleError::DataIntegrity(format!(
                "class label {} outside 0..{}",
                bad, num_classes
            )));
        }

        let rows = bootstrap_rows(x.nrows(), sample_weight, params.seed)?;
        let fitted: Vec<usize> = rows.iter().map(|&i| labels[i]).collect();
        let mut counts = vec![0usize; num_classes];
        for &label in &fitted {
            counts[label] += 1;
        }
        let classes: Vec<usize> = (0..num_classes).filter(|&c| counts[c] > 0).collect();
        let priors = counts.iter().map(|&c| c as f64 / fitted.len() as f64).collect();

        let matrix = dense_rows(x, &rows)?;
        let binary = num_classes == 2;
        let targets: Vec<usize> = if binary { vec![1] } else { (0..num_classes).collect() };
        let columns = targets
            .into_iter()
            .map(|class| {
                if counts[class] == 0 || (binary && classes.len() < 2) {
                    return Ok(None);
                }
                let indicator: Vec<f64> = fitted.iter().map(|&l| if l == class { 1.0 } else { 0.0 }).collect();
                Forest::fit(&matrix, &indicator, params.engine_params(class as u64))
                    .map(Some)
                    .map_err(|e| engine_error("fitting class forest", e))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            rows = fitted.len(),
            num_classes = num_classes,
            classes = ?classes,
            forests = columns.iter().filter(|c| c.is_some()).count(),
            "Fitted probability forest"
        );
        Ok(Self {
            num_features: x.ncols(),
            num_classes,
            classes,
            priors,
            columns,
        })
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn is_binary(&self) -> bool {
        self.num_classes == 2
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.check_consistency()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|e| EnsembleError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| EnsembleError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Structural checks on a deserialized model
    fn check_consistency(&self) -> Result<()> {
        let mismatch = |detail: String| Err(EnsembleError::ArtifactMismatch(detail));
        if self.num_features == 0 {
            return mismatch("classifier declares zero input features".to_string());
        }
        if self.num_classes < 2 || self.priors.len() != self.num_classes {
            return mismatch(format!(
                "classifier declares {} classes with {} priors",
                self.num_classes,
                self.priors.len()
            ));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) || self.classes.iter().any(|&c| c >= self.num_classes) {
            return mismatch(format!("invalid observed classes {:?}", self.classes));
        }

        let expected_columns = if self.is_binary() { 1 } else { self.num_classes };
        if self.columns.len() != expected_columns {
            return mismatch(format!(
                "classifier stores {} class forests, expected {}",
                self.columns.len(),
                expected_columns
            ));
        }
        let consistent = if self.is_binary() {
            self.columns[0].is_some() == (self.classes.len() == 2)
        } else {
            self.columns
                .iter()
                .enumerate()
                .all(|(class, column)| column.is_some() == self.classes.contains(&class))
        };
        if !consistent {
            return mismatch("class forests disagree with the observed classes".to_string());
        }
        Ok(())
    }
}

impl Classifier for ProbabilityForest {
    fn predict_proba(&self, row: ArrayView1<f32>) -> Result<Vec<f32>> {
        let input = dense_row(row)?;

        if self.is_binary() {
            return match self.columns.first() {
                Some(Some(forest)) => {
                    let p = predict_one(forest, &input)?.clamp(0.0, 1.0) as f32;
                    Ok(vec![1.0 - p, p])
                }
                _ => Ok(vec![1.0]),
            };
        }

        let raw = self
            .columns
            .iter()
            .map(|column| match column {
                Some(forest) => predict_one(forest, &input).map(|v| v.max(0.0)),
                None => Ok(0.0),
            })
            .collect::<Result<Vec<f64>>>()?;
        let total: f64 = raw.iter().sum();
        let distribution = if total > 0.0 {
            raw.iter().map(|v| (v / total) as f32).collect()
        } else {
            self.priors.iter().map(|&p| p as f32).collect()
        };
        Ok(distribution)
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
