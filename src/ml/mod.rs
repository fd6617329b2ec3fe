//! Machine learning support for the forecasting strategies
//!
//! - Fit-quality metrics shared by all trained models
//! - SmartCore random forest wrapper used by the sequence strategy

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ml")]
pub mod smartcore;

/// In-sample fit quality of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn calculate(predictions: &[f64], targets: &[f64]) -> Result<Self> {
        if predictions.len() != targets.len() {
            anyhow::bail!(
                "Prediction and target count mismatch: {} vs {}",
                predictions.len(),
                targets.len()
            );
        }
        if predictions.is_empty() {
            anyhow::bail!("No predictions to evaluate");
        }

        let n = predictions.len() as f64;
        let pairs = || predictions.iter().zip(targets.iter());

        let mae = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
        let mse = pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n;

        let mean_target = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();
        let r2 = if ss_tot.abs() < 1e-10 { 0.0 } else { 1.0 - ss_res / ss_tot };

        Ok(Self {
            mae,
            rmse: mse.sqrt(),
            r2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit() {
        let m = ValidationMetrics::calculate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_mismatch_rejected() {
        assert!(ValidationMetrics::calculate(&[1.0], &[1.0, 2.0]).is_err());
        assert!(ValidationMetrics::calculate(&[], &[]).is_err());
    }

    #[test]
    fn test_constant_error() {
        let m = ValidationMetrics::calculate(&[2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((m.mae - 1.0).abs() < 1e-12);
        assert!((m.rmse - 1.0).abs() < 1e-12);
    }
}
