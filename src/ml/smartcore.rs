//! SmartCore random forest wrapper
//!
//! Small forests with bounded depth: the models are retrained on every
//! forecasting run, once per machine.

use anyhow::Result;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::ValidationMetrics;
use crate::config::SequenceModelConfig;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub struct SmartcoreRandomForest {
    model: Forest,
    n_features: usize,
    pub training_samples: usize,
    pub metrics: ValidationMetrics,
}

impl SmartcoreRandomForest {
    pub fn parameters(cfg: &SequenceModelConfig) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(cfg.max_depth),
            min_samples_leaf: 1,
            min_samples_split: 2,
            n_trees: cfg.n_trees,
            m: None, // sqrt(n_features)
            keep_samples: false,
            seed: cfg.seed,
        }
    }

    /// Train on row-major samples `x` with targets `y`
    pub fn train(x: &[Vec<f64>], y: &[f64], params: RandomForestRegressorParameters) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }
        if x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            );
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let mut flat = Vec::with_capacity(n_samples * n_features);
        for row in x {
            if row.len() != n_features {
                anyhow::bail!("All feature vectors must have the same length");
            }
            flat.extend_from_slice(row);
        }

        let x_matrix = DenseMatrix::new(n_samples, n_features, flat, false)
            .map_err(|e| anyhow::anyhow!("Invalid feature matrix: {:?}", e))?;
        let y_vec = y.to_vec();

        let model = Forest::fit(&x_matrix, &y_vec, params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        let fitted = model
            .predict(&x_matrix)
            .map_err(|e| anyhow::anyhow!("Prediction failed during validation: {:?}", e))?;
        let metrics = ValidationMetrics::calculate(&fitted, y)?;

        Ok(Self {
            model,
            n_features,
            training_samples: n_samples,
            metrics,
        })
    }

    pub fn predict_one(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features {
            anyhow::bail!(
                "Expected {} features, got {}",
                self.n_features,
                features.len()
            );
        }
        let x = DenseMatrix::new(1, self.n_features, features.to_vec(), false)
            .map_err(|e| anyhow::anyhow!("Invalid feature row: {:?}", e))?;
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;

        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> RandomForestRegressorParameters {
        SmartcoreRandomForest::parameters(&SequenceModelConfig {
            n_trees: 5,
            max_depth: 4,
            seed: 7,
        })
    }

    #[test]
    fn test_train_and_predict() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| 3.0 * i as f64).collect();

        let model = SmartcoreRandomForest::train(&x, &y, small_params()).unwrap();
        assert_eq!(model.training_samples, 20);

        let p = model.predict_one(&[10.0, 20.0]).unwrap();
        assert!(p > 15.0 && p < 45.0, "prediction {p}");
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let x = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(SmartcoreRandomForest::train(&x, &[1.0, 2.0], small_params()).is_err());
    }

    #[test]
    fn test_feature_count_checked() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let model = SmartcoreRandomForest::train(&x, &y, small_params()).unwrap();
        assert!(model.predict_one(&[1.0, 2.0]).is_err());
    }
}
