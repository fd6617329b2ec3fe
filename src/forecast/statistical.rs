//! ARIMA(p,1,0) strategy
//!
//! The series is differenced once and an AR(p) model without intercept is
//! fitted to the differences by conditional least squares. Forecasts follow
//! the fitted recursion on the differences and are integrated back to levels.

use nalgebra::{DMatrix, DVector};

use super::{ForecastError, ForecastStrategy, StrategyKind};
use crate::config::ForecastConfig;

pub struct StatisticalStrategy {
    order: usize,
    min_len: usize,
}

impl StatisticalStrategy {
    pub fn new(order: usize, min_len: usize) -> Self {
        let order = order.max(1);
        Self {
            order,
            // Differencing costs one point; each coefficient needs one more row.
            min_len: min_len.max(2 * order + 2),
        }
    }

    pub fn from_config(cfg: &ForecastConfig) -> Self {
        Self::new(cfg.ar_order, cfg.statistical_min_len)
    }
}

/// Fitted ARIMA(p,1,0) model
#[derive(Debug, Clone)]
pub struct ArimaModel {
    /// phi_1..phi_p, phi_1 applies to the most recent difference
    coefficients: Vec<f64>,
    last_level: f64,
    /// Last p differences, oldest first
    recent_diffs: Vec<f64>,
}

impl ArimaModel {
    pub fn fit(series: &[f64], order: usize) -> Result<Self, ForecastError> {
        let fail = |reason: &str| ForecastError::model(StrategyKind::Statistical, reason);

        if series.iter().any(|v| !v.is_finite()) {
            return Err(fail("series contains non-finite values"));
        }

        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        if diffs.len() <= order {
            return Err(ForecastError::InsufficientData {
                strategy: StrategyKind::Statistical,
                required: order + 2,
                actual: series.len(),
            });
        }

        let rows = diffs.len() - order;
        let x = DMatrix::from_fn(rows, order, |r, c| diffs[r + order - 1 - c]);
        let y = DVector::from_fn(rows, |r, _| diffs[r + order]);

        let xt = x.transpose();
        let normal = &xt * &x;
        let rhs = &xt * &y;
        let chol = normal
            .cholesky()
            .ok_or_else(|| fail("normal equations are singular; fit did not converge"))?;
        let phi = chol.solve(&rhs);

        if phi.iter().any(|v| !v.is_finite()) {
            return Err(fail("non-finite coefficients"));
        }

        Ok(Self {
            coefficients: phi.iter().copied().collect(),
            last_level: series[series.len() - 1],
            recent_diffs: diffs[diffs.len() - order..].to_vec(),
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut diffs = self.recent_diffs.clone();
        let mut level = self.last_level;
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            let next_diff: f64 = self
                .coefficients
                .iter()
                .enumerate()
                .map(|(i, phi)| phi * diffs[diffs.len() - 1 - i])
                .sum();
            level += next_diff;
            out.push(level);
            diffs.remove(0);
            diffs.push(next_diff);
        }
        out
    }
}

impl ForecastStrategy for StatisticalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Statistical
    }

    fn min_history(&self) -> usize {
        self.min_len
    }

    fn fit_and_forecast(&self, series: &[f64], steps: usize) -> Result<Vec<f64>, ForecastError> {
        self.check_history(series)?;
        let model = ArimaModel::fit(series, self.order)?;
        let out = model.forecast(steps);

        if out.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::model(self.kind(), "forecast diverged"));
        }
        Ok(out)
    }
}
