use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MachineId;

/// Optimized and baseline allocation of one machine at one hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub hour: u32,
    pub optimized_production: f64,
    pub baseline_production: i64,
    pub optimized_cost: f64,
    pub baseline_cost: f64,
}

/// Outcome of a successful optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub machines: usize,
    pub timestamps: usize,
    pub variables: usize,
    /// Per-timestamp plant production limit
    pub plant_limit: f64,
    pub optimized_cost: f64,
    pub baseline_cost: f64,
    pub optimized_production: f64,
    pub baseline_production: f64,
}

impl OptimizationSummary {
    pub fn savings(&self) -> f64 {
        self.baseline_cost - self.optimized_cost
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
