use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::MachineId;

/// Predicted demand of a machine at a future hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    pub predicted_demand: f64,
}

/// Hourly interval covered by one forecasting run, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub steps: usize,
}

impl Horizon {
    /// Horizon of `steps` hours starting one hour after `base`
    pub fn after(base: DateTime<Utc>, steps: usize) -> Self {
        let steps = steps.max(1);
        Self {
            start: base + Duration::hours(1),
            end: base + Duration::hours(steps as i64),
            steps,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.steps).map(move |i| self.start + Duration::hours(i as i64))
    }

    /// Pair predictions with the horizon timestamps
    pub fn points(&self, machine_id: &MachineId, values: &[f64]) -> Vec<ForecastPoint> {
        self.timestamps()
            .zip(values.iter())
            .map(|(timestamp, v)| ForecastPoint {
                timestamp,
                machine_id: machine_id.clone(),
                predicted_demand: *v,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_horizon_after_base() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        let h = Horizon::after(base, 24);

        assert_eq!(h.start, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(h.end, Utc.with_ymd_and_hms(2024, 3, 2, 23, 0, 0).unwrap());
        assert_eq!(h.timestamps().count(), 24);
        assert!(h.contains(h.end));
        assert!(!h.contains(base));
    }

    #[test]
    fn test_horizon_points() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let h = Horizon::after(base, 3);
        let points = h.points(&MachineId::from("M1"), &[1.0, 2.0, 3.0]);

        assert_eq!(points.len(), 3);
        assert_eq!(points[2].predicted_demand, 3.0);
        assert_eq!(points[2].timestamp, base + Duration::hours(3));
    }
}
