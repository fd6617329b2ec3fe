use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plant-unique machine identifier (e.g. `M1`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Machine characteristics used by one optimization run
///
/// Derived by averaging the most recent observations of a machine, so the
/// values are fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub machine_id: MachineId,
    /// Energy consumed per produced unit (kWh/unit)
    pub energy_per_unit: f64,
    /// Units producible per hour
    pub max_capacity: u32,
}

impl MachineSpec {
    pub fn new(machine_id: impl Into<MachineId>, energy_per_unit: f64, max_capacity: u32) -> Self {
        Self {
            machine_id: machine_id.into(),
            energy_per_unit,
            max_capacity,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.energy_per_unit.is_finite() && self.energy_per_unit > 0.0 && self.max_capacity > 0
    }
}

/// One historical hourly observation of a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    /// Hour of day (0-23)
    pub hour: u32,
    pub machine_id: MachineId,
    pub energy_per_unit: f64,
    pub production_demand: u32,
    pub max_capacity: u32,
    /// Price per kWh at that hour
    pub energy_cost: f64,
}

/// `(timestamp, demand)` pair of a machine's demand history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandSample {
    pub timestamp: DateTime<Utc>,
    pub demand: f64,
}

/// Average energy cost of a machine at one hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyCost {
    pub machine_id: MachineId,
    pub hour: u32,
    pub avg_cost: f64,
    /// Number of observations behind the average
    pub samples: u64,
}
