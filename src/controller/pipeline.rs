//! Forecast and optimization runs against the configured stores
//!
//! Runs are serialized: the periodic loop and API triggers never overlap.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::OptimizationSummary;
use crate::forecast::{Capabilities, ForecastBatchReport, ForecastEngine, StrategyKind};
use crate::optimizer::{OptimizationError, ProductionOptimizer};
use crate::repo::Repositories;

/// Condensed forecasting report kept for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRunSummary {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub horizon_start: Option<DateTime<Utc>>,
    pub horizon_end: Option<DateTime<Utc>>,
    pub machines: usize,
    pub skipped: usize,
    pub fallbacks: usize,
    pub rows_written: usize,
    pub strategies: BTreeMap<String, usize>,
}

impl From<&ForecastBatchReport> for ForecastRunSummary {
    fn from(report: &ForecastBatchReport) -> Self {
        Self {
            run_id: report.run_id,
            finished_at: report.finished_at,
            horizon_start: report.horizon.map(|h| h.start),
            horizon_end: report.horizon.map(|h| h.end),
            machines: report.machines.len(),
            skipped: report.skipped.len(),
            fallbacks: report.fallbacks(),
            rows_written: report.rows_written(),
            strategies: report
                .strategy_counts()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunRecord<T> {
    Succeeded(T),
    Failed {
        at: DateTime<Utc>,
        kind: String,
        message: String,
    },
}

impl<T> RunRecord<T> {
    fn failed(kind: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            at: Utc::now(),
            kind: kind.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub capabilities: Capabilities,
    pub strategies: Vec<StrategyKind>,
    /// Hours forecast per machine
    pub forecast_steps: usize,
    pub solver: String,
    pub last_forecast: Option<RunRecord<ForecastRunSummary>>,
    pub last_optimization: Option<RunRecord<OptimizationSummary>>,
}

pub struct Pipeline {
    repos: Repositories,
    forecaster: ForecastEngine,
    optimizer: ProductionOptimizer,
    run_lock: Mutex<()>,
    status: RwLock<PipelineStatus>,
}

impl Pipeline {
    pub fn new(cfg: &Config, repos: Repositories) -> Self {
        let capabilities = Capabilities::for_config(&cfg.forecast);
        let forecaster = ForecastEngine::with_capabilities(&cfg.forecast, capabilities);
        let optimizer = ProductionOptimizer::from_config(&cfg.optimizer);
        Self::with_engines(repos, forecaster, optimizer, capabilities)
    }

    pub fn with_engines(
        repos: Repositories,
        forecaster: ForecastEngine,
        optimizer: ProductionOptimizer,
        capabilities: Capabilities,
    ) -> Self {
        let status = PipelineStatus {
            capabilities,
            strategies: forecaster.strategies(),
            forecast_steps: forecaster.steps(),
            solver: optimizer.solver_name().to_string(),
            last_forecast: None,
            last_optimization: None,
        };
        Self {
            repos,
            forecaster,
            optimizer,
            run_lock: Mutex::new(()),
            status: RwLock::new(status),
        }
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    pub async fn status(&self) -> PipelineStatus {
        self.status.read().await.clone()
    }

    pub async fn forecast(&self) -> Result<ForecastBatchReport> {
        let _guard = self.run_lock.lock().await;
        self.forecast_unlocked().await
    }

    pub async fn optimize(&self) -> Result<OptimizationSummary, OptimizationError> {
        let _guard = self.run_lock.lock().await;
        self.optimize_unlocked().await
    }

    /// Forecast then optimize; an optimization failure does not undo the forecasts
    pub async fn run_cycle(&self) -> Result<OptimizationSummary> {
        let _guard = self.run_lock.lock().await;
        let report = self.forecast_unlocked().await?;
        info!(run_id = %report.run_id, machines = report.machines.len(), "forecast stage done");
        Ok(self.optimize_unlocked().await?)
    }

    async fn forecast_unlocked(&self) -> Result<ForecastBatchReport> {
        let outcome = self
            .forecaster
            .run(
                self.repos.observations.as_ref(),
                self.repos.forecasts.as_ref(),
            )
            .await;

        let record = match &outcome {
            Ok(report) => RunRecord::Succeeded(ForecastRunSummary::from(report)),
            Err(e) => {
                warn!(error = %e, "forecasting run failed");
                RunRecord::failed("Store", format!("{e:#}"))
            }
        };
        self.status.write().await.last_forecast = Some(record);
        outcome
    }

    async fn optimize_unlocked(&self) -> Result<OptimizationSummary, OptimizationError> {
        let outcome = self
            .optimizer
            .run(
                self.repos.observations.as_ref(),
                self.repos.forecasts.as_ref(),
                self.repos.results.as_ref(),
            )
            .await;

        let record = match &outcome {
            Ok(summary) => RunRecord::Succeeded(summary.clone()),
            Err(e) => RunRecord::failed(e.kind(), e),
        };
        self.status.write().await.last_optimization = Some(record);
        outcome
    }
}
