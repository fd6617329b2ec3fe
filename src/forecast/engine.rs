//! Per-machine forecasting with a prioritized fallback chain
//!
//! The chain is fixed when the engine is built. A strategy reporting
//! insufficient history hands the machine to the next one; any other failure
//! (error, panic, malformed output) sends it straight to the naive strategy.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Capabilities, ForecastError, ForecastStrategy, NaiveStrategy, StrategyKind};
use crate::config::ForecastConfig;
use crate::domain::{Horizon, MachineId};
use crate::repo::{ForecastStore, ObservationStore};

/// Which strategy produced a machine's forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastOutcome {
    /// First strategy in the chain with enough history succeeded
    Model { strategy: StrategyKind },
    /// `attempted` failed and the naive strategy stood in
    Fallback {
        attempted: StrategyKind,
        reason: String,
    },
}

impl ForecastOutcome {
    /// Strategy whose values were kept
    pub fn strategy(&self) -> StrategyKind {
        match self {
            Self::Model { strategy } => *strategy,
            Self::Fallback { .. } => StrategyKind::Naive,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineForecast {
    pub machine_id: MachineId,
    pub history_len: usize,
    pub horizon: Horizon,
    pub values: Vec<f64>,
    pub outcome: ForecastOutcome,
}

/// Outcome of one forecasting run over the plant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastBatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the observation store was empty
    pub horizon: Option<Horizon>,
    pub machines: Vec<MachineForecast>,
    /// Machines without usable history
    pub skipped: Vec<MachineId>,
}

impl ForecastBatchReport {
    pub fn rows_written(&self) -> usize {
        self.machines.iter().map(|m| m.values.len()).sum()
    }

    pub fn fallbacks(&self) -> usize {
        self.machines.iter().filter(|m| m.outcome.is_fallback()).count()
    }

    /// Machines per strategy that produced the kept values
    pub fn strategy_counts(&self) -> BTreeMap<StrategyKind, usize> {
        let mut counts = BTreeMap::new();
        for m in &self.machines {
            *counts.entry(m.outcome.strategy()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Clone)]
pub struct ForecastEngine {
    chain: Vec<Arc<dyn ForecastStrategy>>,
    steps: usize,
    workers: usize,
}

impl ForecastEngine {
    /// Build from an explicit chain. A naive tail is appended when missing.
    pub fn new(mut chain: Vec<Arc<dyn ForecastStrategy>>, steps: usize, workers: usize) -> Self {
        if chain.last().map(|s| s.kind()) != Some(StrategyKind::Naive) {
            chain.push(Arc::new(NaiveStrategy));
        }
        Self {
            chain,
            steps: steps.max(1),
            workers: workers.max(1),
        }
    }

    pub fn from_config(cfg: &ForecastConfig) -> Self {
        Self::with_capabilities(cfg, Capabilities::for_config(cfg))
    }

    #[cfg_attr(not(any(feature = "ml", feature = "stats")), allow(unused_variables, unused_mut))]
    pub fn with_capabilities(cfg: &ForecastConfig, caps: Capabilities) -> Self {
        let mut chain: Vec<Arc<dyn ForecastStrategy>> = Vec::new();

        #[cfg(feature = "ml")]
        if caps.sequence {
            chain.push(Arc::new(super::SequenceStrategy::from_config(cfg)));
        }
        #[cfg(feature = "stats")]
        if caps.statistical {
            chain.push(Arc::new(super::StatisticalStrategy::from_config(cfg)));
        }

        let engine = Self::new(chain, cfg.steps, cfg.workers);
        info!(chain = ?engine.strategies(), steps = engine.steps, "forecast engine ready");
        engine
    }

    pub fn strategies(&self) -> Vec<StrategyKind> {
        self.chain.iter().map(|s| s.kind()).collect()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Forecast one series; `None` only for an empty history
    pub fn forecast_series(&self, series: &[f64]) -> Option<(Vec<f64>, ForecastOutcome)> {
        if series.is_empty() {
            return None;
        }

        for strategy in &self.chain {
            match run_guarded(strategy.as_ref(), series, self.steps) {
                Ok(values) => {
                    let outcome = ForecastOutcome::Model {
                        strategy: strategy.kind(),
                    };
                    return Some((values, outcome));
                }
                Err(ForecastError::InsufficientData {
                    strategy,
                    required,
                    actual,
                }) => {
                    debug!(%strategy, required, actual, "not enough history, trying next strategy");
                }
                Err(err @ ForecastError::ModelFailure { .. }) => {
                    warn!(error = %err, "forecast model failed, using naive fallback");
                    let values = NaiveStrategy.fit_and_forecast(series, self.steps).ok()?;
                    let outcome = ForecastOutcome::Fallback {
                        attempted: strategy.kind(),
                        reason: err.to_string(),
                    };
                    return Some((values, outcome));
                }
            }
        }
        None
    }

    /// Forecast many machines on the blocking pool, at most `workers` at once.
    /// Output is sorted by machine; machines with empty series are dropped.
    pub async fn forecast_machines(
        &self,
        inputs: Vec<(MachineId, Vec<f64>)>,
    ) -> Vec<(MachineId, usize, Vec<f64>, ForecastOutcome)> {
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for (machine_id, series) in inputs {
            let engine = self.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                let history_len = series.len();
                let id = machine_id.clone();
                let joined =
                    tokio::task::spawn_blocking(move || engine.forecast_series(&series)).await;
                match joined {
                    Ok(Some((values, outcome))) => Some((machine_id, history_len, values, outcome)),
                    Ok(None) => None,
                    Err(e) => {
                        error!(machine_id = %id, error = %e, "forecast task aborted");
                        None
                    }
                }
            });
        }

        let mut out = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(row)) => out.push(row),
                Ok(None) => {}
                Err(e) => error!(error = %e, "forecast worker failed"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Forecast every machine and replace each machine's horizon in the store
    pub async fn run(
        &self,
        observations: &dyn ObservationStore,
        forecasts: &dyn ForecastStore,
    ) -> Result<ForecastBatchReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let Some(latest) = observations
            .latest_timestamp()
            .await
            .context("failed to read latest observation timestamp")?
        else {
            warn!(%run_id, "no observations; nothing to forecast");
            return Ok(ForecastBatchReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                horizon: None,
                machines: Vec::new(),
                skipped: Vec::new(),
            });
        };
        let horizon = Horizon::after(latest, self.steps);

        let mut inputs = Vec::new();
        let mut skipped = Vec::new();
        for machine_id in observations
            .machine_ids()
            .await
            .context("failed to list machines")?
        {
            let series: Vec<f64> = observations
                .demand_series(&machine_id)
                .await
                .with_context(|| format!("failed to read demand history of {machine_id}"))?
                .into_iter()
                .map(|s| s.demand)
                .collect();
            if series.is_empty() {
                skipped.push(machine_id);
            } else {
                inputs.push((machine_id, series));
            }
        }

        let mut machines = Vec::new();
        for (machine_id, history_len, values, outcome) in self.forecast_machines(inputs).await {
            debug!(%machine_id, history_len, strategy = %outcome.strategy(), "machine forecast");
            machines.push(MachineForecast {
                machine_id,
                history_len,
                horizon,
                values,
                outcome,
            });
        }

        for m in &machines {
            let rows = horizon.points(&m.machine_id, &m.values);
            forecasts
                .replace_range(&m.machine_id, horizon.start, horizon.end, rows)
                .await
                .with_context(|| format!("failed to store forecast of {}", m.machine_id))?;
        }

        let report = ForecastBatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            horizon: Some(horizon),
            machines,
            skipped,
        };
        info!(
            %run_id,
            machines = report.machines.len(),
            skipped = report.skipped.len(),
            fallbacks = report.fallbacks(),
            rows = report.rows_written(),
            horizon_start = %horizon.start,
            horizon_end = %horizon.end,
            "forecasting run complete"
        );
        Ok(report)
    }
}

/// Run one strategy, turning panics and malformed output into model failures
fn run_guarded(
    strategy: &dyn ForecastStrategy,
    series: &[f64],
    steps: usize,
) -> Result<Vec<f64>, ForecastError> {
    let kind = strategy.kind();
    let values = catch_unwind(AssertUnwindSafe(|| strategy.fit_and_forecast(series, steps)))
        .map_err(|_| ForecastError::model(kind, "strategy panicked"))??;

    if values.len() != steps {
        return Err(ForecastError::model(
            kind,
            format!("returned {} values, expected {steps}", values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::model(kind, "non-finite prediction"));
    }
    Ok(values)
}
