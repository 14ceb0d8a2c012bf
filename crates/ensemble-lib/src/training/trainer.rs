//! Fits the three ensemble models and scores them on the held-out partition

use super::config::TrainingConfig;
use super::dataset::{DatasetPreparer, PreparedDataset, RawTable};
use super::metrics::{accuracy, mean_absolute_error, r2_score, roc_auc};
use super::version::{bump_version, INITIAL_VERSION};
use crate::bundle::{BucketModelMeta, BundleStore, Manifest, ModelBundle, WinModelMeta};
use crate::error::{EnsembleError, Result};
use crate::forest::{argmax, Classifier, ForestRegressor, ProbabilityForest, Regressor};
use crate::models::{ClassBalance, TrainingMetrics};
use crate::predictor::OutputFormatter;
use crate::schema::FeatureSchema;
use ndarray::ArrayView2;
use std::time::Instant;
use tracing::{debug, info};

/// Loss/win ratio on the training labels, with the win count floored to one
pub fn scale_pos_weight(train_labels: &[f32]) -> (f64, ClassBalance) {
    let win = train_labels.iter().filter(|&&y| y == 1.0).count();
    let loss = train_labels.len() - win;
    (loss as f64 / win.max(1) as f64, ClassBalance { loss, win })
}

/// Row weights applying `scale_pos_weight` to the winning rows
pub fn positive_class_weights(train_labels: &[f32], spw: f64) -> Vec<f32> {
    train_labels
        .iter()
        .map(|&y| if y == 1.0 { spw as f32 } else { 1.0 })
        .collect()
}

/// Inverse-frequency sample weights, `total / (n_buckets * max(count, 1))`.
/// Also returns the per-bucket counts.
pub fn bucket_sample_weights(train_buckets: &[usize], n_buckets: usize) -> (Vec<f32>, Vec<usize>) {
    let mut counts = vec![0usize; n_buckets];
    for &b in train_buckets {
        if let Some(count) = counts.get_mut(b) {
            *count += 1;
        }
    }
    let total = train_buckets.len() as f64;
    let per_bucket: Vec<f64> = counts
        .iter()
        .map(|&c| total / (n_buckets as f64 * c.max(1) as f64))
        .collect();
    let weights = train_buckets
        .iter()
        .map(|&b| per_bucket.get(b).copied().unwrap_or(1.0) as f32)
        .collect();
    (weights, counts)
}

/// Output of one training run, ready to persist or serve
#[derive(Debug)]
pub struct TrainedBundle {
    pub schema: FeatureSchema,
    pub win_model: ProbabilityForest,
    pub bucket_model: ProbabilityForest,
    pub mfe_model: ForestRegressor,
    pub win_meta: WinModelMeta,
    pub bucket_meta: BucketModelMeta,
    pub metrics: TrainingMetrics,
}

impl TrainedBundle {
    pub fn version(&self) -> &str {
        &self.schema.version
    }

    /// Serve directly from memory, without a round trip through disk
    pub fn into_bundle(self) -> Result<ModelBundle> {
        ModelBundle::new(
            self.schema,
            Box::new(self.win_model),
            Box::new(self.bucket_model),
            Box::new(self.mfe_model),
            Some(self.metrics),
        )
    }
}

/// Trains the win classifier, bucket classifier and MFE regressor
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn prepare(&self, table: &RawTable) -> Result<PreparedDataset> {
        DatasetPreparer::new(&self.config).prepare(table)
    }

    pub fn train(&self, data: &PreparedDataset, version: &str) -> Result<TrainedBundle> {
        if data.train_size() == 0 || data.test_size() == 0 {
            return Err(EnsembleError::DataIntegrity(
                "both train and test partitions must be non-empty".to_string(),
            ));
        }
        let schema = FeatureSchema::new(data.feature_names.clone(), self.config.buckets.clone(), version)?;
        let n_buckets = schema.buckets.len();
        let train_x = data.train_features();
        let started = Instant::now();

        // win/loss classifier
        let (spw, class_balance) = scale_pos_weight(data.train_binary());
        let win_labels: Vec<usize> = data.train_binary().iter().map(|&y| usize::from(y == 1.0)).collect();
        let win_weights = positive_class_weights(data.train_binary(), spw);
        debug!(scale_pos_weight = spw, win = class_balance.win, loss = class_balance.loss, "Fitting win classifier");
        let win_model = ProbabilityForest::fit(&self.config.win_params, train_x, &win_labels, 2, Some(&win_weights))?;

        // MFE bucket classifier
        let (bucket_weights, bucket_counts) = bucket_sample_weights(data.train_buckets(), n_buckets);
        debug!(counts = ?bucket_counts, "Fitting bucket classifier");
        let bucket_model = ProbabilityForest::fit(
            &self.config.bucket_params,
            train_x,
            data.train_buckets(),
            n_buckets,
            Some(&bucket_weights),
        )?;

        // MFE regressor
        debug!("Fitting MFE regressor");
        let mfe_model = ForestRegressor::fit(&self.config.mfe_params, train_x, data.train_mfe(), None)?;

        let metrics = self.evaluate(
            data,
            version,
            &win_model,
            &bucket_model,
            &mfe_model,
            class_balance,
            spw,
        )?;

        info!(
            version = %version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            v1_auc = ?metrics.v1_auc,
            v1_accuracy = metrics.v1_accuracy,
            v2_accuracy = metrics.v2_accuracy,
            v3_r2 = metrics.v3_r2,
            v3_mae = metrics.v3_mae,
            "Trained ensemble models"
        );

        let win_meta = WinModelMeta {
            features: data.feature_names.clone(),
            n_features: data.feature_names.len(),
            train_size: data.train_size(),
            test_size: data.test_size(),
            class_balance,
            scale_pos_weight: spw,
            version: version.to_string(),
        };
        let bucket_meta = BucketModelMeta {
            features: data.feature_names.clone(),
            n_features: data.feature_names.len(),
            train_size: data.train_size(),
            test_size: data.test_size(),
            mfe_bucket_edges: schema.buckets.edges.clone(),
            mfe_bucket_labels: schema.buckets.labels.clone(),
            bucket_counts,
            version: version.to_string(),
        };

        Ok(TrainedBundle {
            schema,
            win_model,
            bucket_model,
            mfe_model,
            win_meta,
            bucket_meta,
            metrics,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        data: &PreparedDataset,
        version: &str,
        win_model: &ProbabilityForest,
        bucket_model: &ProbabilityForest,
        mfe_model: &ForestRegressor,
        class_balance: ClassBalance,
        spw: f64,
    ) -> Result<TrainingMetrics> {
        let test_x: ArrayView2<f32> = data.test_features();

        let win_probs = test_x
            .rows()
            .into_iter()
            .map(|row| Ok(OutputFormatter::win_probability(&win_model.predict_proba(row)?)))
            .collect::<Result<Vec<f32>>>()?;
        let win_preds: Vec<f64> = win_probs.iter().map(|&p| if p > 0.5 { 1.0 } else { 0.0 }).collect();
        let win_truth: Vec<f64> = data.test_binary().iter().map(|&y| y as f64).collect();

        let bucket_preds = test_x
            .rows()
            .into_iter()
            .map(|row| Ok(argmax(&bucket_model.predict_proba(row)?) as f64))
            .collect::<Result<Vec<f64>>>()?;
        let bucket_truth: Vec<f64> = data.test_buckets().iter().map(|&b| b as f64).collect();

        // MFE is non-negative; negative estimates are scored as zero
        let mfe_preds = test_x
            .rows()
            .into_iter()
            .map(|row| Ok(mfe_model.predict(row)?.max(0.0)))
            .collect::<Result<Vec<f32>>>()?;

        Ok(TrainingMetrics {
            version: version.to_string(),
            training_size: data.len(),
            train_size: data.train_size(),
            test_size: data.test_size(),
            n_features: data.feature_names.len(),
            class_balance,
            scale_pos_weight: spw,
            v1_auc: roc_auc(data.test_binary(), &win_probs),
            v1_accuracy: accuracy(&win_truth, &win_preds),
            v2_accuracy: accuracy(&bucket_truth, &bucket_preds),
            v3_r2: r2_score(data.test_mfe(), &mfe_preds),
            v3_mae: mean_absolute_error(data.test_mfe(), &mfe_preds),
        })
    }

    /// Prepare, fit and publish in one step. Without an explicit version the
    /// currently published one is bumped.
    pub fn train_and_publish(
        &self,
        table: &RawTable,
        store: &BundleStore,
        version: Option<&str>,
    ) -> Result<Manifest> {
        let version = match version {
            Some(v) => v.to_string(),
            None => store
                .current_version()?
                .map_or_else(|| INITIAL_VERSION.to_string(), |v| bump_version(&v)),
        };
        let data = self.prepare(table)?;
        let trained = self.train(&data, &version)?;
        store.publish(&trained)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::forest::ForestParams;
    use crate::training::dataset::RawValue;

    /// 1000 time-ordered rows: 350 of the first 800 lose, 50 of the last 200
    fn chronological_table() -> RawTable {
        let columns = ["end_timestamp", "rsi", "outcome", "max_favorable_excursion"];
        let mut table = RawTable::new(columns.iter().map(|c| c.to_string()).collect());
        for i in 0..1000 {
            let loss = if i < 800 { i % 16 < 7 } else { i % 4 == 0 };
            table
                .push_row(vec![
                    RawValue::Number(1_700_000_000.0 + i as f64 * 3600.0),
                    RawValue::Number((i % 100) as f64),
                    RawValue::Text(if loss { "loss" } else { "win" }.to_string()),
                    RawValue::Number((i % 30) as f64 * 0.1),
                ])
                .unwrap();
        }
        table
    }

    #[test]
    fn test_scale_pos_weight_uses_counts() {
        let (spw, balance) = scale_pos_weight(&[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(spw, 3.0);
        assert_eq!(balance, ClassBalance { loss: 3, win: 1 });

        let (spw, _) = scale_pos_weight(&[0.0, 0.0]);
        assert_eq!(spw, 2.0);
    }

    #[test]
    fn test_bucket_weights_floor_empty_buckets() {
        let (weights, counts) = bucket_sample_weights(&[0, 0, 0, 1], 5);
        assert_eq!(counts, vec![3, 1, 0, 0, 0]);
        // 4 / (5 * 3) and 4 / (5 * 1)
        assert!((weights[0] - 4.0 / 15.0).abs() < 1e-6);
        assert!((weights[3] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_train_produces_consistent_bundle() {
        let trainer = ModelTrainer::new(fast_config()).unwrap();
        let data = trainer.prepare(&synthetic_table()).unwrap();
        let trained = trainer.train(&data, "v1.0").unwrap();

        assert_eq!(trained.win_meta.features, trained.bucket_meta.features);
        assert_eq!(trained.win_meta.version, trained.bucket_meta.version);
        assert_eq!(trained.metrics.train_size, 40);
        assert_eq!(trained.metrics.test_size, 10);
        assert_eq!(trained.bucket_model.num_classes(), 5);
        assert!(!trained.schema.feature_names.iter().any(|f| f == "r_multiple" || f == "id"));
        assert!(trained.metrics.v1_accuracy >= 0.0 && trained.metrics.v1_accuracy <= 1.0);
        assert!(trained.metrics.v3_mae >= 0.0);

        let bundle = trained.into_bundle().unwrap();
        assert_eq!(bundle.version(), "v1.0");
    }

    #[test]
    fn test_mfe_metrics_score_clamped_estimates() {
        let trainer = ModelTrainer::new(fast_config()).unwrap();
        let data = trainer.prepare(&synthetic_table()).unwrap();
        let trained = trainer.train(&data, "v1.0").unwrap();

        let clamped: Vec<f32> = data
            .test_features()
            .rows()
            .into_iter()
            .map(|row| trained.mfe_model.predict(row).unwrap().max(0.0))
            .collect();
        let expected = mean_absolute_error(data.test_mfe(), &clamped);
        assert!((trained.metrics.v3_mae - expected).abs() < 1e-9);
    }

    #[test]
    fn test_positive_class_weights_scale_wins_only() {
        assert_eq!(positive_class_weights(&[0.0, 1.0, 1.0], 0.5), vec![1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_scale_pos_weight_comes_from_training_rows_only() {
        let config = TrainingConfig {
            win_params: ForestParams {
                n_trees: 5,
                ..fast_params()
            },
            bucket_params: ForestParams {
                n_trees: 5,
                ..fast_params()
            },
            mfe_params: ForestParams {
                n_trees: 5,
                ..fast_params()
            },
            ..Default::default()
        };
        let trainer = ModelTrainer::new(config).unwrap();
        let data = trainer.prepare(&chronological_table()).unwrap();

        assert_eq!(data.len(), 1000);
        assert_eq!(data.binary_target.iter().filter(|&&y| y == 1.0).count(), 600);
        assert_eq!((data.train_size(), data.test_size()), (800, 200));

        let trained = trainer.train(&data, "v1.0").unwrap();
        // 350 losses / 450 wins in the first 800 rows; the full set would give 400 / 600
        assert_eq!(trained.metrics.class_balance, ClassBalance { loss: 350, win: 450 });
        assert!((trained.metrics.scale_pos_weight - 350.0 / 450.0).abs() < 1e-12);
        assert_eq!(trained.win_meta.scale_pos_weight, trained.metrics.scale_pos_weight);
        assert_eq!(trained.metrics.training_size, 1000);
        assert_eq!(trained.metrics.test_size, 200);
    }

    #[test]
    fn test_single_class_training_partition_still_trains() {
        let mut config = fast_config();
        config.train_fraction = 0.5;
        let trainer = ModelTrainer::new(config).unwrap();
        let mut table = RawTable::new(vec!["rsi".into(), "outcome".into(), "max_favorable_excursion".into()]);
        for i in 0..10 {
            let outcome = if i < 5 { "loss" } else { "win" };
            table
                .push_row(vec![
                    RawValue::Number(i as f64),
                    RawValue::Text(outcome.into()),
                    RawValue::Number(0.1 * i as f64),
                ])
                .unwrap();
        }
        let data = trainer.prepare(&table).unwrap();
        let trained = trainer.train(&data, "v1.0").unwrap();

        // only losses in training: the classifier reports one column, which is
        // read as the win probability; AUC is undefined on an all-win test set
        assert_eq!(trained.metrics.class_balance, ClassBalance { loss: 5, win: 0 });
        assert_eq!(trained.metrics.scale_pos_weight, 5.0);
        assert_eq!(trained.metrics.v1_auc, None);
        assert_eq!(trained.metrics.v1_accuracy, 1.0);
    }

    #[test]
    fn test_all_win_training_partition_still_trains() {
        let mut config = fast_config();
        config.train_fraction = 0.5;
        let trainer = ModelTrainer::new(config).unwrap();
        let mut table = RawTable::new(vec!["rsi".into(), "outcome".into(), "max_favorable_excursion".into()]);
        for i in 0..10 {
            let outcome = if i < 5 { "win" } else { "loss" };
            table
                .push_row(vec![
                    RawValue::Number(i as f64),
                    RawValue::Text(outcome.into()),
                    RawValue::Number(0.1 * i as f64),
                ])
                .unwrap();
        }
        let data = trainer.prepare(&table).unwrap();
        let trained = trainer.train(&data, "v1.0").unwrap();

        // no losses: scale_pos_weight is zero and every win keeps its row
        assert_eq!(trained.metrics.class_balance, ClassBalance { loss: 0, win: 5 });
        assert_eq!(trained.metrics.scale_pos_weight, 0.0);
        assert_eq!(trained.win_model.classes(), &[1]);
        assert_eq!(trained.metrics.v1_accuracy, 0.0);
    }
}
