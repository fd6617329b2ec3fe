use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::domain::{MachineId, Observation};

/// Chance that an hour sees a demand spike
const SPIKE_PROBABILITY: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub machine_id: MachineId,
    pub energy_per_unit: f64,
    pub max_capacity: u32,
}

/// Price per kWh at an hour of day
pub fn energy_cost_at(hour: u32) -> f64 {
    let h = hour as f64;
    let price = if (9..=21).contains(&hour) {
        0.18 + 0.02 * (h / 3.0).sin()
    } else {
        0.10 + 0.01 * (h / 4.0).sin()
    };
    (price * 1000.0).round() / 1000.0
}

pub struct PlantSimulator {
    hours: usize,
    profiles: Vec<MachineProfile>,
    rng: StdRng,
}

impl PlantSimulator {
    pub fn new(cfg: &SimulationConfig) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let profiles = (1..=cfg.machines)
            .map(|idx| {
                let energy: f64 = rng.gen_range(1.5..=4.0);
                MachineProfile {
                    machine_id: MachineId::new(format!("M{idx}")),
                    energy_per_unit: (energy * 100.0).round() / 100.0,
                    max_capacity: rng.gen_range(40..=120),
                }
            })
            .collect();

        Self {
            hours: cfg.hours,
            profiles,
            rng,
        }
    }

    pub fn profiles(&self) -> &[MachineProfile] {
        &self.profiles
    }

    /// Hour-aligned start so the history ends just before the current hour
    pub fn default_start(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let aligned = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        aligned - Duration::hours(self.hours as i64)
    }

    /// One row per machine per hour from `start`
    pub fn generate(&mut self, start: DateTime<Utc>) -> Vec<Observation> {
        let utilisation = Uniform::new(0.0_f64, 1.0);
        let spike_size = Uniform::new_inclusive(10_u32, 50);

        let mut rows = Vec::with_capacity(self.hours * self.profiles.len());
        for h in 0..self.hours {
            let timestamp = start + Duration::hours(h as i64);
            let hour = timestamp.hour();
            let daily_factor =
                1.0 + 0.6 * (hour as f64 / 24.0 * std::f64::consts::TAU).sin();
            let energy_cost = energy_cost_at(hour);

            for profile in &self.profiles {
                let cap = profile.max_capacity;
                let load = 0.4 + 0.6 * utilisation.sample(&mut self.rng);
                let mut demand = (cap as f64 * load * daily_factor).max(0.0) as u32;
                if self.rng.gen_bool(SPIKE_PROBABILITY) {
                    demand = cap.min(demand + spike_size.sample(&mut self.rng));
                }

                rows.push(Observation {
                    timestamp,
                    hour,
                    machine_id: profile.machine_id.clone(),
                    energy_per_unit: profile.energy_per_unit,
                    production_demand: demand,
                    max_capacity: cap,
                    energy_cost,
                });
            }
        }
        rows
    }
}
