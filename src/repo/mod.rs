//! Persistence contracts of the scheduler and their implementations
//!
//! - [`ObservationStore`]: read-only historical feed (plus append for the simulator)
//! - [`ForecastStore`]: per-machine horizon replacement
//! - [`ResultStore`]: whole-table replacement of optimization results

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{
    DemandSample, ForecastPoint, HourlyCost, MachineId, MachineSpec, Observation,
    OptimizationResult,
};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::MemoryStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Machines with at least one observation, sorted
    async fn machine_ids(&self) -> Result<Vec<MachineId>>;

    /// Demand history of a machine, oldest first
    async fn demand_series(&self, machine_id: &MachineId) -> Result<Vec<DemandSample>>;

    /// Latest observation timestamp across the plant
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Specs averaged over observations newer than `latest - trailing`
    async fn machine_specs(&self, trailing: Duration) -> Result<Vec<MachineSpec>>;

    /// Average energy cost per (machine, hour of day)
    async fn hourly_energy_costs(&self) -> Result<Vec<HourlyCost>>;

    /// Append rows, skipping (machine, timestamp) pairs already present.
    /// Returns the number of rows stored.
    async fn append_observations(&self, rows: Vec<Observation>) -> Result<usize>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Atomically delete the machine's points in `[from, to]` and insert `rows`
    async fn replace_range(
        &self,
        machine_id: &MachineId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        rows: Vec<ForecastPoint>,
    ) -> Result<()>;

    /// Every stored point, ordered by machine then timestamp
    async fn all_forecasts(&self) -> Result<Vec<ForecastPoint>>;

    async fn forecasts_for(&self, machine_id: &MachineId) -> Result<Vec<ForecastPoint>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Atomically swap the whole result set
    async fn replace_all(&self, rows: Vec<OptimizationResult>) -> Result<()>;

    /// Every stored row, ordered by machine then timestamp
    async fn all_results(&self) -> Result<Vec<OptimizationResult>>;
}

/// Store handles shared by the pipeline and the API
#[derive(Clone)]
pub struct Repositories {
    pub observations: Arc<dyn ObservationStore>,
    pub forecasts: Arc<dyn ForecastStore>,
    pub results: Arc<dyn ResultStore>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        #[cfg(feature = "db")]
        {
            if let Some(url) = cfg.db.url.as_deref() {
                let store = Arc::new(pg::PgStore::connect(url).await?);
                return Ok(Self {
                    observations: store.clone(),
                    forecasts: store.clone(),
                    results: store,
                });
            }
        }

        if cfg.db.url.is_some() {
            tracing::warn!("db.url is set but the `db` feature is disabled; using in-memory store");
        }
        Ok(Self::in_memory(Arc::new(MemoryStore::default())))
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            observations: store.clone(),
            forecasts: store.clone(),
            results: store,
        }
    }
}
