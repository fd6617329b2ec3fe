//! PostgreSQL implementation of the stores
//!
//! Expected tables (provisioned outside this crate):
//! - `raw_data(timestamp timestamptz, hour int, machine_id text, energy_per_unit float8,
//!   production_demand int, max_capacity int, energy_cost float8)`
//! - `forecasts(timestamp timestamptz, machine_id text, predicted_demand float8)`
//! - `optimizations(timestamp timestamptz, machine_id text, hour int, optimized_production float8,
//!   baseline_production bigint, optimized_cost float8, baseline_cost float8)`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::{debug, info};

use super::{ForecastStore, ObservationStore, ResultStore};
use crate::domain::{
    DemandSample, ForecastPoint, HourlyCost, MachineId, MachineSpec, Observation,
    OptimizationResult,
};

pub struct PgStore {
    pub pool: PgPool,
}

#[derive(Debug, FromRow)]
struct SpecRow {
    machine_id: String,
    energy_per_unit: f64,
    max_capacity: f64,
}

#[derive(Debug, FromRow)]
struct CostRow {
    machine_id: String,
    hour: i32,
    avg_cost: f64,
    samples: i64,
}

#[derive(Debug, FromRow)]
struct ForecastRow {
    timestamp: DateTime<Utc>,
    machine_id: String,
    predicted_demand: f64,
}

#[derive(Debug, FromRow)]
struct ResultRow {
    timestamp: DateTime<Utc>,
    machine_id: String,
    hour: i32,
    optimized_production: f64,
    baseline_production: i64,
    optimized_cost: f64,
    baseline_cost: f64,
}

impl From<ForecastRow> for ForecastPoint {
    fn from(r: ForecastRow) -> Self {
        Self {
            timestamp: r.timestamp,
            machine_id: r.machine_id.into(),
            predicted_demand: r.predicted_demand,
        }
    }
}

impl From<ResultRow> for OptimizationResult {
    fn from(r: ResultRow) -> Self {
        Self {
            timestamp: r.timestamp,
            machine_id: r.machine_id.into(),
            hour: r.hour.max(0) as u32,
            optimized_production: r.optimized_production,
            baseline_production: r.baseline_production,
            optimized_cost: r.optimized_cost,
            baseline_cost: r.baseline_cost,
        }
    }
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("Failed to connect to database")?;
        info!("database connection pool initialized");
        Ok(Self { pool })
    }
}

#[async_trait]
impl ObservationStore for PgStore {
    async fn machine_ids(&self) -> Result<Vec<MachineId>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT machine_id FROM raw_data ORDER BY machine_id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list machines")?;
        Ok(ids.into_iter().map(MachineId::from).collect())
    }

    async fn demand_series(&self, machine_id: &MachineId) -> Result<Vec<DemandSample>> {
        let rows: Vec<(DateTime<Utc>, i32)> = sqlx::query_as(
            r#"
            SELECT timestamp, production_demand
            FROM raw_data
            WHERE machine_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(machine_id.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch demand history of {machine_id}"))?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, demand)| DemandSample {
                timestamp,
                demand: demand as f64,
            })
            .collect())
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar("SELECT MAX(timestamp) FROM raw_data")
            .fetch_one(&self.pool)
            .await
            .context("Failed to fetch latest observation")?;
        Ok(latest)
    }

    async fn machine_specs(&self, trailing: Duration) -> Result<Vec<MachineSpec>> {
        let rows: Vec<SpecRow> = sqlx::query_as(
            r#"
            SELECT machine_id,
                   AVG(energy_per_unit)::DOUBLE PRECISION AS energy_per_unit,
                   AVG(max_capacity)::DOUBLE PRECISION AS max_capacity
            FROM raw_data
            WHERE timestamp > (SELECT MAX(timestamp) FROM raw_data) - make_interval(secs => $1)
            GROUP BY machine_id
            ORDER BY machine_id
            "#,
        )
        .bind(trailing.num_seconds() as f64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch machine specs")?;

        Ok(rows
            .into_iter()
            .map(|r| MachineSpec {
                machine_id: r.machine_id.into(),
                energy_per_unit: r.energy_per_unit,
                max_capacity: r.max_capacity.round().max(0.0) as u32,
            })
            .collect())
    }

    async fn hourly_energy_costs(&self) -> Result<Vec<HourlyCost>> {
        let rows: Vec<CostRow> = sqlx::query_as(
            r#"
            SELECT machine_id, hour,
                   AVG(energy_cost)::DOUBLE PRECISION AS avg_cost,
                   COUNT(*) AS samples
            FROM raw_data
            GROUP BY machine_id, hour
            ORDER BY machine_id, hour
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch hourly energy costs")?;

        Ok(rows
            .into_iter()
            .map(|r| HourlyCost {
                machine_id: r.machine_id.into(),
                hour: r.hour.max(0) as u32,
                avg_cost: r.avg_cost,
                samples: r.samples.max(0) as u64,
            })
            .collect())
    }

    async fn append_observations(&self, rows: Vec<Observation>) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;
        let mut inserted = 0usize;

        for o in &rows {
            let result = sqlx::query(
                r#"
                INSERT INTO raw_data (timestamp, hour, machine_id, energy_per_unit,
                                      production_demand, max_capacity, energy_cost)
                SELECT $1, $2, $3, $4, $5, $6, $7
                WHERE NOT EXISTS (
                    SELECT 1 FROM raw_data WHERE machine_id = $3 AND timestamp = $1
                )
                "#,
            )
            .bind(o.timestamp)
            .bind(o.hour as i32)
            .bind(o.machine_id.as_str())
            .bind(o.energy_per_unit)
            .bind(o.production_demand as i32)
            .bind(o.max_capacity as i32)
            .bind(o.energy_cost)
            .execute(&mut *tx)
            .await
            .context("Failed to insert observation")?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        info!(rows = inserted, "observations appended");
        Ok(inserted)
    }
}

#[async_trait]
impl ForecastStore for PgStore {
    async fn replace_range(
        &self,
        machine_id: &MachineId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        rows: Vec<ForecastPoint>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        let deleted = sqlx::query(
            "DELETE FROM forecasts WHERE machine_id = $1 AND timestamp BETWEEN $2 AND $3",
        )
        .bind(machine_id.as_str())
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await
        .context("Failed to delete forecast horizon")?;

        for p in &rows {
            anyhow::ensure!(
                &p.machine_id == machine_id,
                "forecast row for {} passed to replace_range of {}",
                p.machine_id,
                machine_id
            );
            sqlx::query(
                "INSERT INTO forecasts (timestamp, machine_id, predicted_demand) VALUES ($1, $2, $3)",
            )
            .bind(p.timestamp)
            .bind(p.machine_id.as_str())
            .bind(p.predicted_demand)
            .execute(&mut *tx)
            .await
            .context("Failed to insert forecast")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(
            machine_id = %machine_id,
            deleted = deleted.rows_affected(),
            inserted = rows.len(),
            "forecast horizon replaced"
        );
        Ok(())
    }

    async fn all_forecasts(&self) -> Result<Vec<ForecastPoint>> {
        let rows: Vec<ForecastRow> = sqlx::query_as(
            "SELECT timestamp, machine_id, predicted_demand FROM forecasts ORDER BY machine_id, timestamp",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch forecasts")?;
        Ok(rows.into_iter().map(ForecastPoint::from).collect())
    }

    async fn forecasts_for(&self, machine_id: &MachineId) -> Result<Vec<ForecastPoint>> {
        let rows: Vec<ForecastRow> = sqlx::query_as(
            r#"
            SELECT timestamp, machine_id, predicted_demand
            FROM forecasts
            WHERE machine_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(machine_id.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch forecasts")?;
        Ok(rows.into_iter().map(ForecastPoint::from).collect())
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn replace_all(&self, rows: Vec<OptimizationResult>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("DELETE FROM optimizations")
            .execute(&mut *tx)
            .await
            .context("Failed to clear optimization results")?;

        for r in &rows {
            sqlx::query(
                r#"
                INSERT INTO optimizations (timestamp, machine_id, hour, optimized_production,
                                           baseline_production, optimized_cost, baseline_cost)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(r.timestamp)
            .bind(r.machine_id.as_str())
            .bind(r.hour as i32)
            .bind(r.optimized_production)
            .bind(r.baseline_production)
            .bind(r.optimized_cost)
            .bind(r.baseline_cost)
            .execute(&mut *tx)
            .await
            .context("Failed to insert optimization result")?;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        info!(rows = rows.len(), "optimization results replaced");
        Ok(())
    }

    async fn all_results(&self) -> Result<Vec<OptimizationResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT timestamp, machine_id, hour, optimized_production, baseline_production,
                   optimized_cost, baseline_cost
            FROM optimizations
            ORDER BY machine_id, timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch optimization results")?;
        Ok(rows.into_iter().map(OptimizationResult::from).collect())
    }
}
