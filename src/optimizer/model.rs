//! Solver-agnostic linear programs and the plant production model
//!
//! Variable `m * T + t` is the production of machine `m` (sorted by id) at
//! timestamp `t` (sorted ascending), with `T` distinct forecast timestamps.
//!
//! Each unit of forecast demand left unproduced costs `shortfall_penalty`.
//! Dropping the constant, the objective coefficient of a variable is its
//! energy cost minus the penalty, so the solver fills demand up to the plant
//! limit and gives the scarce capacity to the cheapest machines.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use super::{OptimizationError, PriceCurve};
use crate::domain::{ForecastPoint, MachineId, MachineSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSense {
    LessEq,
    GreaterEq,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableBounds {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// `(variable index, coefficient)`
    pub terms: Vec<(usize, f64)>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(i, c)| c * values[*i]).sum()
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            ConstraintSense::LessEq => lhs <= self.rhs + tolerance,
            ConstraintSense::GreaterEq => lhs >= self.rhs - tolerance,
            ConstraintSense::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// Minimise `objective . x` subject to bounds and constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    pub variables: Vec<VariableBounds>,
    pub objective: Vec<f64>,
    pub constraints: Vec<LinearConstraint>,
}

impl LinearProgram {
    pub fn add_variable(&mut self, lower: f64, upper: f64, cost: f64) -> usize {
        self.variables.push(VariableBounds { lower, upper });
        self.objective.push(cost);
        self.variables.len() - 1
    }

    pub fn add_constraint(&mut self, terms: Vec<(usize, f64)>, sense: ConstraintSense, rhs: f64) {
        self.constraints.push(LinearConstraint { terms, sense, rhs });
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.iter().zip(values).map(|(c, x)| c * x).sum()
    }

    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        values.len() == self.variables.len()
            && self
                .variables
                .iter()
                .zip(values)
                .all(|(b, x)| *x >= b.lower - tolerance && *x <= b.upper + tolerance)
            && self.constraints.iter().all(|c| c.is_satisfied(values, tolerance))
    }
}

/// How the per-timestamp plant limit is derived
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlantLimit {
    /// Share of the summed capacity of the modelled machines
    Factor(f64),
    Absolute(f64),
}

impl PlantLimit {
    pub fn resolve(&self, total_capacity: f64) -> f64 {
        match *self {
            Self::Factor(f) => f * total_capacity,
            Self::Absolute(limit) => limit,
        }
    }
}

/// Plant LP plus the data needed to reconcile its solution
#[derive(Debug, Clone)]
pub struct ProductionModel {
    pub machines: Vec<MachineSpec>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// Forecast per variable, `None` where the machine has no point
    pub forecasts: Vec<Option<f64>>,
    /// Energy cost of one unit per variable
    pub coefficients: Vec<f64>,
    pub plant_limit: f64,
    pub shortfall_penalty: f64,
    pub program: LinearProgram,
}

impl ProductionModel {
    pub fn build(
        forecasts: &[ForecastPoint],
        specs: &[MachineSpec],
        prices: &PriceCurve,
        limit: PlantLimit,
        shortfall_penalty: Option<f64>,
    ) -> Result<Self, OptimizationError> {
        if forecasts.is_empty() {
            return Err(OptimizationError::NoForecasts);
        }

        let spec_by_id: HashMap<&MachineId, &MachineSpec> =
            specs.iter().map(|s| (&s.machine_id, s)).collect();

        let mut by_machine: BTreeMap<&MachineId, HashMap<DateTime<Utc>, f64>> = BTreeMap::new();
        for p in forecasts {
            by_machine
                .entry(&p.machine_id)
                .or_default()
                .insert(p.timestamp, p.predicted_demand);
        }

        let mut machines = Vec::new();
        let mut series = Vec::new();
        for (machine_id, points) in by_machine {
            match spec_by_id.get(machine_id) {
                Some(spec) if spec.is_valid() => {
                    machines.push((*spec).clone());
                    series.push(points);
                }
                Some(_) => warn!(%machine_id, "machine spec invalid; excluded from optimization"),
                None => warn!(%machine_id, "no machine spec for forecast; excluded from optimization"),
            }
        }
        if machines.is_empty() {
            return Err(OptimizationError::NoMachineSpecs);
        }

        let timestamps: Vec<DateTime<Utc>> = series
            .iter()
            .flat_map(|points| points.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let total_capacity: f64 = machines.iter().map(|m| m.max_capacity as f64).sum();
        let plant_limit = limit.resolve(total_capacity);

        let mut coefficients = Vec::with_capacity(machines.len() * timestamps.len());
        for spec in &machines {
            for ts in &timestamps {
                coefficients.push(spec.energy_per_unit * prices.cost(&spec.machine_id, ts.hour()));
            }
        }
        let max_coef = coefficients.iter().copied().fold(0.0_f64, f64::max);
        let shortfall_penalty = shortfall_penalty.unwrap_or(10.0 * max_coef + 1.0);
        if shortfall_penalty <= max_coef {
            warn!(
                shortfall_penalty,
                max_unit_cost = max_coef,
                "shortfall penalty below some unit costs; that demand will be left unmet"
            );
        }

        let mut program = LinearProgram::default();
        let mut model_forecasts = Vec::with_capacity(coefficients.len());
        for (spec, points) in machines.iter().zip(&series) {
            for ts in &timestamps {
                let idx = program.variables.len();
                program.add_variable(
                    0.0,
                    spec.max_capacity as f64,
                    coefficients[idx] - shortfall_penalty,
                );

                let forecast = points.get(ts).copied();
                let ceiling = forecast.map(|f| f.max(0.0)).unwrap_or(0.0);
                program.add_constraint(vec![(idx, 1.0)], ConstraintSense::LessEq, ceiling);
                model_forecasts.push(forecast);
            }
        }

        let n_ts = timestamps.len();
        for t in 0..n_ts {
            let terms = (0..machines.len()).map(|m| (m * n_ts + t, 1.0)).collect();
            program.add_constraint(terms, ConstraintSense::LessEq, plant_limit);
        }

        Ok(Self {
            machines,
            timestamps,
            forecasts: model_forecasts,
            coefficients,
            plant_limit,
            shortfall_penalty,
            program,
        })
    }

    pub fn index(&self, machine: usize, timestamp: usize) -> usize {
        machine * self.timestamps.len() + timestamp
    }

    /// Upper bound of a variable after the demand ceiling
    pub fn ceiling(&self, idx: usize) -> f64 {
        let cap = self.program.variables[idx].upper;
        let demand = self.forecasts[idx].map(|f| f.max(0.0)).unwrap_or(0.0);
        cap.min(demand)
    }

    pub fn variable_count(&self) -> usize {
        self.program.variables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{CostCurveMode, DEFAULT_ENERGY_COST};
    use chrono::{Duration, TimeZone};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn point(machine: &str, h: i64, v: f64) -> ForecastPoint {
        ForecastPoint {
            timestamp: ts(h),
            machine_id: MachineId::from(machine),
            predicted_demand: v,
        }
    }

    fn flat_prices() -> PriceCurve {
        PriceCurve::from_costs(&[], CostCurveMode::PlantWide, DEFAULT_ENERGY_COST)
    }

    #[test]
    fn test_layout_and_missing_forecast_ceiling() {
        let forecasts = vec![point("A", 0, 50.0), point("A", 1, -5.0), point("B", 1, 60.0)];
        let specs = vec![MachineSpec::new("A", 2.0, 80), MachineSpec::new("B", 1.0, 40)];
        let model =
            ProductionModel::build(&forecasts, &specs, &flat_prices(), PlantLimit::Factor(0.9), None)
                .unwrap();

        assert_eq!(model.timestamps, vec![ts(0), ts(1)]);
        assert_eq!(model.variable_count(), 4);
        assert!((model.plant_limit - 108.0).abs() < 1e-9);

        // B has no point at hour 0, A's negative forecast clamps to zero
        assert_eq!(model.ceiling(model.index(1, 0)), 0.0);
        assert_eq!(model.ceiling(model.index(0, 1)), 0.0);
        assert_eq!(model.ceiling(model.index(1, 1)), 40.0);
        assert!((model.coefficients[model.index(0, 0)] - 0.30).abs() < 1e-12);
        // auto penalty is 10x the largest unit cost plus one
        assert!((model.shortfall_penalty - 4.0).abs() < 1e-12);
        assert!((model.program.objective[0] - (0.30 - 4.0)).abs() < 1e-12);

        // 4 ceilings + 2 plant rows
        assert_eq!(model.program.constraints.len(), 6);
    }

    #[test]
    fn test_machines_without_spec_excluded() {
        let forecasts = vec![point("A", 0, 10.0), point("Z", 0, 10.0)];
        let specs = vec![MachineSpec::new("A", 1.0, 20)];
        let model =
            ProductionModel::build(&forecasts, &specs, &flat_prices(), PlantLimit::Factor(0.9), None)
                .unwrap();
        assert_eq!(model.machines.len(), 1);
        assert!((model.plant_limit - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_errors() {
        let err = ProductionModel::build(&[], &[], &flat_prices(), PlantLimit::Factor(0.9), None)
            .unwrap_err();
        assert!(matches!(err, OptimizationError::NoForecasts));

        let err = ProductionModel::build(
            &[point("A", 0, 1.0)],
            &[],
            &flat_prices(),
            PlantLimit::Absolute(5.0),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, OptimizationError::NoMachineSpecs));
    }

    #[test]
    fn test_feasibility_check() {
        let mut lp = LinearProgram::default();
        let x = lp.add_variable(0.0, 10.0, 1.0);
        let y = lp.add_variable(0.0, 10.0, 2.0);
        lp.add_constraint(vec![(x, 1.0), (y, 1.0)], ConstraintSense::GreaterEq, 5.0);

        assert!(lp.is_feasible(&[5.0, 0.0], 1e-9));
        assert!(!lp.is_feasible(&[2.0, 2.0], 1e-9));
        assert!(!lp.is_feasible(&[11.0, 0.0], 1e-9));
        assert_eq!(lp.objective_value(&[1.0, 2.0]), 5.0);
    }
}
