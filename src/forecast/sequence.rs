//! Sequence-model strategy
//!
//! Slides a window of `window` hours over the history, pairs each window with
//! the hour that follows it, trains a random forest on those pairs and rolls
//! it forward one hour at a time.

use std::collections::VecDeque;
use tracing::debug;

use super::{ForecastError, ForecastStrategy, StrategyKind};
use crate::config::{ForecastConfig, SequenceModelConfig};
use crate::ml::smartcore::SmartcoreRandomForest;

pub struct SequenceStrategy {
    window: usize,
    min_training_windows: usize,
    model: SequenceModelConfig,
}

impl SequenceStrategy {
    pub fn new(window: usize, min_training_windows: usize, model: SequenceModelConfig) -> Self {
        Self {
            window: window.max(1),
            min_training_windows: min_training_windows.max(1),
            model,
        }
    }

    pub fn from_config(cfg: &ForecastConfig) -> Self {
        Self::new(cfg.window, cfg.min_training_windows, cfg.sequence.clone())
    }
}

/// Supervised pairs: `series[i..i+window]` -> `series[i+window]`
pub fn make_windows(series: &[f64], window: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    if window == 0 || series.len() <= window {
        return (Vec::new(), Vec::new());
    }
    series
        .windows(window + 1)
        .map(|w| (w[..window].to_vec(), w[window]))
        .unzip()
}

impl ForecastStrategy for SequenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequence
    }

    fn min_history(&self) -> usize {
        self.window + self.min_training_windows
    }

    fn fit_and_forecast(&self, series: &[f64], steps: usize) -> Result<Vec<f64>, ForecastError> {
        self.check_history(series)?;

        let (x, y) = make_windows(series, self.window);
        let params = SmartcoreRandomForest::parameters(&self.model);
        let model = SmartcoreRandomForest::train(&x, &y, params)
            .map_err(|e| ForecastError::model(self.kind(), e.to_string()))?;

        debug!(
            samples = model.training_samples,
            mae = model.metrics.mae,
            r2 = model.metrics.r2,
            "sequence model trained"
        );

        let mut window: VecDeque<f64> = series[series.len() - self.window..].iter().copied().collect();
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let input: Vec<f64> = window.iter().copied().collect();
            let next = model
                .predict_one(&input)
                .map_err(|e| ForecastError::model(self.kind(), e.to_string()))?;
            if !next.is_finite() {
                return Err(ForecastError::model(self.kind(), "non-finite prediction"));
            }
            out.push(next);
            window.pop_front();
            window.push_back(next);
        }
        Ok(out)
    }
}
