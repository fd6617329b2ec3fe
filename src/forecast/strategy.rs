use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Forecasting strategies, in descending priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Windowed regressor rolled out autoregressively
    Sequence,
    /// ARIMA(p,1,0)
    Statistical,
    /// Repeat the last observation
    Naive,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("{strategy}: insufficient data (need {required} points, have {actual})")]
    InsufficientData {
        strategy: StrategyKind,
        required: usize,
        actual: usize,
    },

    #[error("{strategy}: model failure: {reason}")]
    ModelFailure {
        strategy: StrategyKind,
        reason: String,
    },
}

impl ForecastError {
    pub fn model(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self::ModelFailure {
            strategy,
            reason: reason.into(),
        }
    }
}

/// A demand forecaster working on one machine's history
///
/// Implementations are CPU bound and synchronous; the engine runs them on the
/// blocking pool.
pub trait ForecastStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Shortest history the strategy accepts
    fn min_history(&self) -> usize;

    /// Fit on `series` (oldest first) and return exactly `steps` predictions
    fn fit_and_forecast(&self, series: &[f64], steps: usize) -> Result<Vec<f64>, ForecastError>;

    fn check_history(&self, series: &[f64]) -> Result<(), ForecastError> {
        if series.len() < self.min_history() {
            return Err(ForecastError::InsufficientData {
                strategy: self.kind(),
                required: self.min_history(),
                actual: series.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_strategy_kind_names() {
        assert_eq!(StrategyKind::Sequence.to_string(), "sequence");
        assert_eq!(StrategyKind::from_str("statistical").unwrap(), StrategyKind::Statistical);
        assert!(StrategyKind::Sequence < StrategyKind::Naive);
    }

    #[test]
    fn test_error_display() {
        let err = ForecastError::InsufficientData {
            strategy: StrategyKind::Statistical,
            required: 30,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "statistical: insufficient data (need 30 points, have 12)"
        );
    }
}
