use axum::{
    extract::{FromRef, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::error::ApiError;
use super::response::ApiResponse;
use crate::{
    auth::AuthBearer,
    config::AuthConfig,
    controller::{AppState, ForecastRunSummary, PipelineStatus, TaskStatus},
    domain::{ForecastPoint, MachineId, OptimizationResult, OptimizationSummary},
};

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.cfg.auth.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(get_status))
        .route("/forecasts", get(list_forecasts))
        .route("/forecasts/run", post(run_forecasts))
        .route("/optimizations", get(list_optimizations))
        .route("/optimizations/run", post(run_optimization))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    #[serde(flatten)]
    pub pipeline: PipelineStatus,
    pub scheduler: Option<TaskStatus>,
}

pub async fn get_status(State(st): State<AppState>) -> ApiResponse<StatusBody> {
    let scheduler = match &st.scheduler {
        Some(handle) => Some(handle.read().await.clone()),
        None => None,
    };
    ApiResponse::success(StatusBody {
        pipeline: st.pipeline.status().await,
        scheduler,
    })
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub machine_id: Option<String>,
}

pub async fn list_forecasts(
    State(st): State<AppState>,
    Query(q): Query<ForecastQuery>,
) -> Result<ApiResponse<Vec<ForecastPoint>>, ApiError> {
    let store = &st.pipeline.repos().forecasts;
    let rows = match q.machine_id.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::BadRequest("machine_id must not be empty".into())),
        Some(id) => store.forecasts_for(&MachineId::from(id)).await?,
        None => store.all_forecasts().await?,
    };
    let count = rows.len();
    Ok(ApiResponse::success(rows).with_count(count))
}

pub async fn run_forecasts(
    State(st): State<AppState>,
    _auth: AuthBearer,
) -> Result<ApiResponse<ForecastRunSummary>, ApiError> {
    let started = Instant::now();
    let report = st.pipeline.forecast().await?;
    Ok(ApiResponse::success(ForecastRunSummary::from(&report))
        .with_duration(started.elapsed().as_millis() as u64))
}

#[derive(Debug, Serialize)]
pub struct OptimizationTotals {
    pub optimized_cost: f64,
    pub baseline_cost: f64,
    pub savings: f64,
    pub optimized_production: f64,
    pub baseline_production: i64,
}

#[derive(Debug, Serialize)]
pub struct OptimizationTable {
    pub rows: Vec<OptimizationResult>,
    pub totals: OptimizationTotals,
}

impl From<Vec<OptimizationResult>> for OptimizationTable {
    fn from(rows: Vec<OptimizationResult>) -> Self {
        let optimized_cost: f64 = rows.iter().map(|r| r.optimized_cost).sum();
        let baseline_cost: f64 = rows.iter().map(|r| r.baseline_cost).sum();
        let totals = OptimizationTotals {
            optimized_cost,
            baseline_cost,
            savings: baseline_cost - optimized_cost,
            optimized_production: rows.iter().map(|r| r.optimized_production).sum(),
            baseline_production: rows.iter().map(|r| r.baseline_production).sum(),
        };
        Self { rows, totals }
    }
}

pub async fn list_optimizations(
    State(st): State<AppState>,
) -> Result<ApiResponse<OptimizationTable>, ApiError> {
    let rows = st.pipeline.repos().results.all_results().await?;
    let count = rows.len();
    Ok(ApiResponse::success(OptimizationTable::from(rows)).with_count(count))
}

pub async fn run_optimization(
    State(st): State<AppState>,
    _auth: AuthBearer,
) -> Result<ApiResponse<OptimizationSummary>, ApiError> {
    let started = Instant::now();
    let summary = st.pipeline.optimize().await?;
    Ok(ApiResponse::success(summary).with_duration(started.elapsed().as_millis() as u64))
}
