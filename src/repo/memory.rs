//! In-memory implementation of all three stores
//!
//! Each replace operation runs under a single write lock, so readers observe
//! either the old or the new rows, never a mix.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

use super::{ForecastStore, ObservationStore, ResultStore};
use crate::domain::{
    DemandSample, ForecastPoint, HourlyCost, MachineId, MachineSpec, Observation,
    OptimizationResult,
};

#[derive(Default)]
pub struct MemoryStore {
    observations: RwLock<Vec<Observation>>,
    forecasts: RwLock<BTreeMap<(MachineId, DateTime<Utc>), f64>>,
    results: RwLock<Vec<OptimizationResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observations(rows: Vec<Observation>) -> Self {
        let store = Self::default();
        store.insert_observations(rows);
        store
    }

    fn insert_observations(&self, rows: Vec<Observation>) -> usize {
        let mut guard = self.observations.write();
        let mut seen: HashSet<(MachineId, DateTime<Utc>)> = guard
            .iter()
            .map(|o| (o.machine_id.clone(), o.timestamp))
            .collect();

        let before = guard.len();
        for row in rows {
            if seen.insert((row.machine_id.clone(), row.timestamp)) {
                guard.push(row);
            }
        }
        guard.len() - before
    }

    pub fn observation_count(&self) -> usize {
        self.observations.read().len()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn machine_ids(&self) -> Result<Vec<MachineId>> {
        Ok(self
            .observations
            .read()
            .iter()
            .map(|o| o.machine_id.clone())
            .sorted()
            .dedup()
            .collect())
    }

    async fn demand_series(&self, machine_id: &MachineId) -> Result<Vec<DemandSample>> {
        Ok(self
            .observations
            .read()
            .iter()
            .filter(|o| &o.machine_id == machine_id)
            .map(|o| DemandSample {
                timestamp: o.timestamp,
                demand: o.production_demand as f64,
            })
            .sorted_by_key(|s| s.timestamp)
            .collect())
    }

    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.observations.read().iter().map(|o| o.timestamp).max())
    }

    async fn machine_specs(&self, trailing: Duration) -> Result<Vec<MachineSpec>> {
        let guard = self.observations.read();
        let Some(latest) = guard.iter().map(|o| o.timestamp).max() else {
            return Ok(Vec::new());
        };
        let since = latest - trailing;

        let grouped = guard
            .iter()
            .filter(|o| o.timestamp > since)
            .into_group_map_by(|o| o.machine_id.clone());

        Ok(grouped
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(machine_id, rows)| {
                let n = rows.len() as f64;
                let energy = rows.iter().map(|o| o.energy_per_unit).sum::<f64>() / n;
                let capacity = rows.iter().map(|o| o.max_capacity as f64).sum::<f64>() / n;
                MachineSpec {
                    machine_id,
                    energy_per_unit: energy,
                    max_capacity: capacity.round() as u32,
                }
            })
            .collect())
    }

    async fn hourly_energy_costs(&self) -> Result<Vec<HourlyCost>> {
        let guard = self.observations.read();
        let grouped = guard
            .iter()
            .into_group_map_by(|o| (o.machine_id.clone(), o.hour));

        Ok(grouped
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|((machine_id, hour), rows)| HourlyCost {
                machine_id,
                hour,
                avg_cost: rows.iter().map(|o| o.energy_cost).sum::<f64>() / rows.len() as f64,
                samples: rows.len() as u64,
            })
            .collect())
    }

    async fn append_observations(&self, rows: Vec<Observation>) -> Result<usize> {
        Ok(self.insert_observations(rows))
    }
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn replace_range(
        &self,
        machine_id: &MachineId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        rows: Vec<ForecastPoint>,
    ) -> Result<()> {
        if let Some(bad) = rows.iter().find(|r| &r.machine_id != machine_id) {
            bail!(
                "forecast row for {} passed to replace_range of {}",
                bad.machine_id,
                machine_id
            );
        }

        let mut guard = self.forecasts.write();
        guard.retain(|(m, ts), _| !(m == machine_id && *ts >= from && *ts <= to));
        for row in rows {
            guard.insert((row.machine_id, row.timestamp), row.predicted_demand);
        }
        Ok(())
    }

    async fn all_forecasts(&self) -> Result<Vec<ForecastPoint>> {
        Ok(self
            .forecasts
            .read()
            .iter()
            .map(|((machine_id, timestamp), v)| ForecastPoint {
                timestamp: *timestamp,
                machine_id: machine_id.clone(),
                predicted_demand: *v,
            })
            .collect())
    }

    async fn forecasts_for(&self, machine_id: &MachineId) -> Result<Vec<ForecastPoint>> {
        Ok(self
            .all_forecasts()
            .await?
            .into_iter()
            .filter(|p| &p.machine_id == machine_id)
            .collect())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn replace_all(&self, mut rows: Vec<OptimizationResult>) -> Result<()> {
        rows.sort_by(|a, b| {
            a.machine_id
                .cmp(&b.machine_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        *self.results.write() = rows;
        Ok(())
    }

    async fn all_results(&self) -> Result<Vec<OptimizationResult>> {
        Ok(self.results.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn obs(machine: &str, h: i64, demand: u32, cap: u32, epu: f64, cost: f64) -> Observation {
        Observation {
            timestamp: ts(h),
            hour: ts(h).hour(),
            machine_id: machine.into(),
            energy_per_unit: epu,
            production_demand: demand,
            max_capacity: cap,
            energy_cost: cost,
        }
    }

    fn point(machine: &str, h: i64, v: f64) -> ForecastPoint {
        ForecastPoint {
            timestamp: ts(h),
            machine_id: machine.into(),
            predicted_demand: v,
        }
    }

    #[tokio::test]
    async fn test_demand_series_sorted_per_machine() {
        let store = MemoryStore::with_observations(vec![
            obs("M2", 1, 7, 50, 2.0, 0.1),
            obs("M1", 2, 30, 80, 2.0, 0.1),
            obs("M1", 0, 10, 80, 2.0, 0.1),
            obs("M1", 1, 20, 80, 2.0, 0.1),
        ]);

        let series = store.demand_series(&"M1".into()).await.unwrap();
        let values: Vec<f64> = series.iter().map(|s| s.demand).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);

        let ids = store.machine_ids().await.unwrap();
        assert_eq!(ids, vec![MachineId::from("M1"), MachineId::from("M2")]);
        assert_eq!(store.latest_timestamp().await.unwrap(), Some(ts(2)));
    }

    #[tokio::test]
    async fn test_duplicate_observations_skipped() {
        let store = MemoryStore::new();
        let n = store
            .append_observations(vec![obs("M1", 0, 1, 10, 1.0, 0.1), obs("M1", 0, 2, 10, 1.0, 0.1)])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.observation_count(), 1);
    }

    #[tokio::test]
    async fn test_specs_use_trailing_window() {
        let store = MemoryStore::with_observations(vec![
            obs("M1", 0, 0, 10, 9.0, 0.1),
            obs("M1", 30, 0, 80, 2.0, 0.1),
            obs("M1", 40, 0, 80, 3.0, 0.1),
        ]);

        let specs = store.machine_specs(Duration::hours(24)).await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].max_capacity, 80);
        assert!((specs[0].energy_per_unit - 2.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_hourly_costs_grouped() {
        let store = MemoryStore::with_observations(vec![
            obs("M1", 0, 0, 10, 1.0, 0.10),
            obs("M1", 24, 0, 10, 1.0, 0.20),
            obs("M1", 1, 0, 10, 1.0, 0.30),
        ]);

        let costs = store.hourly_energy_costs().await.unwrap();
        assert_eq!(costs.len(), 2);
        assert_eq!(costs[0].hour, 0);
        assert_eq!(costs[0].samples, 2);
        assert!((costs[0].avg_cost - 0.15).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_replace_range_keeps_outside_points() {
        let store = MemoryStore::new();
        store
            .replace_range(&"M1".into(), ts(1), ts(3), vec![point("M1", 1, 1.0), point("M1", 2, 1.0), point("M1", 3, 1.0)])
            .await
            .unwrap();
        store
            .replace_range(&"M2".into(), ts(1), ts(1), vec![point("M2", 1, 5.0)])
            .await
            .unwrap();

        store
            .replace_range(&"M1".into(), ts(2), ts(4), vec![point("M1", 2, 2.0), point("M1", 3, 2.0), point("M1", 4, 2.0)])
            .await
            .unwrap();

        let m1 = store.forecasts_for(&"M1".into()).await.unwrap();
        let values: Vec<f64> = m1.iter().map(|p| p.predicted_demand).collect();
        assert_eq!(values, vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(store.forecasts_for(&"M2".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_range_rejects_foreign_rows() {
        let store = MemoryStore::new();
        let res = store
            .replace_range(&"M1".into(), ts(1), ts(1), vec![point("M2", 1, 1.0)])
            .await;
        assert!(res.is_err());
        assert!(store.all_forecasts().await.unwrap().is_empty());
    }
}
