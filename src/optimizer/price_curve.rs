//! Hour-of-day energy price lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

use crate::domain::{HourlyCost, MachineId};

pub const DEFAULT_ENERGY_COST: f64 = 0.15;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CostCurveMode {
    /// One price per hour of day, sample-weighted over every machine
    #[default]
    PlantWide,
    /// Price looked up per (machine, hour of day)
    PerMachine,
}

#[derive(Debug, Clone)]
pub struct PriceCurve {
    mode: CostCurveMode,
    plant: [Option<f64>; 24],
    per_machine: HashMap<(MachineId, u32), f64>,
    default_cost: f64,
}

impl PriceCurve {
    pub fn from_costs(costs: &[HourlyCost], mode: CostCurveMode, default_cost: f64) -> Self {
        let mut sums = [(0.0_f64, 0.0_f64); 24];
        let mut per_machine = HashMap::new();

        for c in costs
            .iter()
            .filter(|c| c.hour < 24 && c.avg_cost.is_finite())
        {
            // Rows without a sample count still carry one average
            let weight = c.samples.max(1) as f64;
            let slot = &mut sums[c.hour as usize];
            slot.0 += c.avg_cost * weight;
            slot.1 += weight;
            per_machine.insert((c.machine_id.clone(), c.hour), c.avg_cost);
        }

        let mut plant = [None; 24];
        for (hour, (sum, weight)) in sums.iter().enumerate() {
            if *weight > 0.0 {
                plant[hour] = Some(sum / weight);
            }
        }

        Self {
            mode,
            plant,
            per_machine,
            default_cost,
        }
    }

    pub fn cost(&self, machine_id: &MachineId, hour: u32) -> f64 {
        let found = match self.mode {
            CostCurveMode::PlantWide => self.plant.get(hour as usize).copied().flatten(),
            CostCurveMode::PerMachine => self.per_machine.get(&(machine_id.clone(), hour)).copied(),
        };
        found.unwrap_or(self.default_cost)
    }

    /// Hours of day with a plant-wide price
    pub fn known_hours(&self) -> usize {
        self.plant.iter().filter(|p| p.is_some()).count()
    }
}
