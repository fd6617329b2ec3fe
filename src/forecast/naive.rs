use super::{ForecastError, ForecastStrategy, StrategyKind};

/// Persistence forecast: every future hour equals the last observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveStrategy;

impl ForecastStrategy for NaiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Naive
    }

    fn min_history(&self) -> usize {
        1
    }

    fn fit_and_forecast(&self, series: &[f64], steps: usize) -> Result<Vec<f64>, ForecastError> {
        self.check_history(series)?;
        let last = series[series.len() - 1];
        Ok(vec![last; steps])
    }
}
