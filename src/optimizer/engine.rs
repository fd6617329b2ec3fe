use chrono::{Duration, Timelike, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    default_linear_solver, LinearSolver, OptimizationError, PlantLimit, PriceCurve,
    ProductionModel, RunPhase, SolveOutcome, SolveStatus,
};
use crate::config::OptimizerConfig;
use crate::domain::{
    ForecastPoint, HourlyCost, MachineSpec, OptimizationResult, OptimizationSummary,
};
use crate::repo::{ForecastStore, ObservationStore, ResultStore};

const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Reconciled rows of one optimal solve
#[derive(Debug, Clone)]
pub struct ProductionPlan {
    pub rows: Vec<OptimizationResult>,
    pub machines: usize,
    pub timestamps: usize,
    pub variables: usize,
    pub plant_limit: f64,
}

impl ProductionPlan {
    pub fn optimized_cost(&self) -> f64 {
        self.rows.iter().map(|r| r.optimized_cost).sum()
    }

    pub fn baseline_cost(&self) -> f64 {
        self.rows.iter().map(|r| r.baseline_cost).sum()
    }
}

pub struct ProductionOptimizer {
    cfg: OptimizerConfig,
    solver: Arc<dyn LinearSolver>,
}

impl ProductionOptimizer {
    pub fn new(cfg: OptimizerConfig, solver: Arc<dyn LinearSolver>) -> Self {
        Self { cfg, solver }
    }

    pub fn from_config(cfg: &OptimizerConfig) -> Self {
        Self::new(cfg.clone(), default_linear_solver())
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    pub fn plant_limit(&self) -> PlantLimit {
        match self.cfg.plant_capacity_limit {
            Some(limit) => PlantLimit::Absolute(limit),
            None => PlantLimit::Factor(self.cfg.plant_capacity_factor),
        }
    }

    pub fn price_curve(&self, costs: &[HourlyCost]) -> PriceCurve {
        PriceCurve::from_costs(costs, self.cfg.cost_curve, self.cfg.default_energy_cost)
    }

    pub fn build_model(
        &self,
        forecasts: &[ForecastPoint],
        specs: &[MachineSpec],
        costs: &[HourlyCost],
    ) -> Result<ProductionModel, OptimizationError> {
        ProductionModel::build(
            forecasts,
            specs,
            &self.price_curve(costs),
            self.plant_limit(),
            self.cfg.shortfall_penalty,
        )
    }

    /// Build, solve and reconcile in the calling thread
    pub fn plan(
        &self,
        forecasts: &[ForecastPoint],
        specs: &[MachineSpec],
        costs: &[HourlyCost],
    ) -> Result<ProductionPlan, OptimizationError> {
        let model = self.build_model(forecasts, specs, costs)?;
        let outcome = self.solver.solve(&model.program);
        reconcile(&model, outcome)
    }

    /// Full run against the stores; the result store is only written on an optimal solve
    pub async fn run(
        &self,
        observations: &dyn ObservationStore,
        forecasts: &dyn ForecastStore,
        results: &dyn ResultStore,
    ) -> Result<OptimizationSummary, OptimizationError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let outcome = self.run_phases(run_id, observations, forecasts, results).await;
        match outcome {
            Ok(plan) => {
                let summary = OptimizationSummary {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    machines: plan.machines,
                    timestamps: plan.timestamps,
                    variables: plan.variables,
                    plant_limit: plan.plant_limit,
                    optimized_cost: plan.optimized_cost(),
                    baseline_cost: plan.baseline_cost(),
                    optimized_production: plan.rows.iter().map(|r| r.optimized_production).sum(),
                    baseline_production: plan
                        .rows
                        .iter()
                        .map(|r| r.baseline_production as f64)
                        .sum(),
                };
                info!(
                    %run_id,
                    total_cost = summary.optimized_cost,
                    baseline_cost = summary.baseline_cost,
                    savings = summary.savings(),
                    duration_ms = summary.duration_ms(),
                    "optimal solution found"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(%run_id, phase = %RunPhase::Failed, kind = e.kind(), error = %e, "optimization run failed");
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        run_id: Uuid,
        observations: &dyn ObservationStore,
        forecasts: &dyn ForecastStore,
        results: &dyn ResultStore,
    ) -> Result<ProductionPlan, OptimizationError> {
        info!(%run_id, phase = %RunPhase::Fetching, "optimization phase");
        let points = forecasts.all_forecasts().await?;
        if points.is_empty() {
            return Err(OptimizationError::NoForecasts);
        }
        let specs = observations
            .machine_specs(Duration::hours(self.cfg.spec_window_hours))
            .await?;
        let costs = observations.hourly_energy_costs().await?;

        info!(%run_id, phase = %RunPhase::BuildingModel, forecasts = points.len(), specs = specs.len(), "optimization phase");
        let model = self.build_model(&points, &specs, &costs)?;

        info!(
            %run_id,
            phase = %RunPhase::Solving,
            solver = self.solver.name(),
            variables = model.variable_count(),
            constraints = model.program.constraints.len(),
            plant_limit = model.plant_limit,
            "optimization phase"
        );
        let (model, outcome) = self.solve_blocking(model).await;
        let plan = reconcile(&model, outcome)?;

        info!(%run_id, phase = %RunPhase::Persisting, rows = plan.rows.len(), "optimization phase");
        results.replace_all(plan.rows.clone()).await?;
        Ok(plan)
    }

    async fn solve_blocking(&self, model: ProductionModel) -> (ProductionModel, SolveOutcome) {
        let solver = self.solver.clone();
        let program = model.program.clone();
        let task = tokio::task::spawn_blocking(move || solver.solve(&program));

        let joined = match self.cfg.solve_timeout_seconds {
            Some(secs) => match tokio::time::timeout(std::time::Duration::from_secs(secs), task).await
            {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_secs = secs, "LP solve timed out");
                    let status = SolveStatus::Other(format!("timed out after {secs}s"));
                    return (model, SolveOutcome::failed(status));
                }
            },
            None => task.await,
        };

        let outcome = joined.unwrap_or_else(|e| {
            SolveOutcome::failed(SolveStatus::Other(format!("solver task failed: {e}")))
        });
        (model, outcome)
    }
}

/// Turn an optimal solution into result rows with baseline comparison
pub fn reconcile(
    model: &ProductionModel,
    outcome: SolveOutcome,
) -> Result<ProductionPlan, OptimizationError> {
    match outcome.status {
        SolveStatus::Optimal => {}
        SolveStatus::Unavailable => {
            return Err(OptimizationError::SolverUnavailable(
                "no LP backend compiled in".to_string(),
            ))
        }
        status => return Err(OptimizationError::InfeasibleOrSuboptimal(status)),
    }
    if outcome.values.len() != model.variable_count() {
        return Err(OptimizationError::InfeasibleOrSuboptimal(SolveStatus::Other(
            format!(
                "solver returned {} values for {} variables",
                outcome.values.len(),
                model.variable_count()
            ),
        )));
    }
    if !model.program.is_feasible(&outcome.values, FEASIBILITY_TOLERANCE) {
        return Err(OptimizationError::InfeasibleOrSuboptimal(SolveStatus::Other(
            "solution violates constraints".to_string(),
        )));
    }

    let mut rows = Vec::new();
    for (m, spec) in model.machines.iter().enumerate() {
        for (t, ts) in model.timestamps.iter().enumerate() {
            let idx = model.index(m, t);
            let Some(forecast) = model.forecasts[idx] else {
                continue;
            };
            let coef = model.coefficients[idx];
            let optimized = outcome.values[idx].clamp(0.0, model.ceiling(idx));
            let baseline_units = forecast.max(0.0).min(spec.max_capacity as f64);

            rows.push(OptimizationResult {
                timestamp: *ts,
                machine_id: spec.machine_id.clone(),
                hour: ts.hour(),
                optimized_production: optimized,
                baseline_production: baseline_units.floor() as i64,
                optimized_cost: coef * optimized,
                baseline_cost: coef * baseline_units,
            });
        }
    }

    Ok(ProductionPlan {
        rows,
        machines: model.machines.len(),
        timestamps: model.timestamps.len(),
        variables: model.variable_count(),
        plant_limit: model.plant_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MachineId;
    use crate::optimizer::MockLinearSolver;
    use crate::repo::{MemoryStore, MockForecastStore, MockObservationStore, MockResultStore};
    use chrono::{DateTime, TimeZone};

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

    fn optimizer_with(solver: Arc<dyn LinearSolver>, limit: Option<f64>) -> ProductionOptimizer {
        let cfg = OptimizerConfig {
            plant_capacity_limit: limit,
            ..OptimizerConfig::default()
        };
        ProductionOptimizer::new(cfg, solver)
    }

    fn status_solver(status: SolveStatus) -> Arc<dyn LinearSolver> {
        let mut solver = MockLinearSolver::new();
        solver.expect_name().return_const("mock");
        solver
            .expect_solve()
            .returning(move |_| SolveOutcome::failed(status.clone()));
        Arc::new(solver)
    }

    fn existing_row() -> OptimizationResult {
        OptimizationResult {
            timestamp: ts(0),
            machine_id: MachineId::from("OLD"),
            hour: 0,
            optimized_production: 1.0,
            baseline_production: 1,
            optimized_cost: 1.0,
            baseline_cost: 1.0,
        }
    }

    #[test]
    fn test_reconcile_rejects_non_optimal() {
        let optimizer = optimizer_with(status_solver(SolveStatus::Infeasible), None);
        let err = optimizer
            .plan(&[point("A", 0, 5.0)], &[MachineSpec::new("A", 1.0, 10)], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizationError::InfeasibleOrSuboptimal(SolveStatus::Infeasible)
        ));

        let optimizer = optimizer_with(status_solver(SolveStatus::Unavailable), None);
        let err = optimizer
            .plan(&[point("A", 0, 5.0)], &[MachineSpec::new("A", 1.0, 10)], &[])
            .unwrap_err();
        assert!(matches!(err, OptimizationError::SolverUnavailable(_)));
    }

    #[test]
    fn test_reconcile_rejects_constraint_violation() {
        let mut solver = MockLinearSolver::new();
        solver.expect_solve().returning(|_| SolveOutcome {
            status: SolveStatus::Optimal,
            values: vec![9.0],
            objective: None,
        });
        let optimizer = optimizer_with(Arc::new(solver), None);
        let err = optimizer
            .plan(&[point("A", 0, 5.0)], &[MachineSpec::new("A", 1.0, 10)], &[])
            .unwrap_err();
        assert!(matches!(err, OptimizationError::InfeasibleOrSuboptimal(_)));
    }

    #[tokio::test]
    async fn test_no_forecasts_leaves_results_untouched() {
        let observations = MockObservationStore::new();
        let mut forecasts = MockForecastStore::new();
        forecasts.expect_all_forecasts().returning(|| Ok(Vec::new()));
        let mut results = MockResultStore::new();
        results.expect_replace_all().never();

        let optimizer = optimizer_with(status_solver(SolveStatus::Optimal), None);
        let err = optimizer
            .run(&observations, &forecasts, &results)
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizationError::NoForecasts));
    }

    #[tokio::test]
    async fn test_infeasible_leaves_results_untouched() {
        let store = store_with_forecast_and_result().await;

        let optimizer = optimizer_with(status_solver(SolveStatus::Infeasible), None);
        let err = optimizer
            .run(&observations_for_a(), &store, &store)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "InfeasibleOrSuboptimal");
        assert_eq!(store.all_results().await.unwrap(), vec![existing_row()]);
    }

    #[tokio::test]
    async fn test_store_failure_is_distinct() {
        let observations = MockObservationStore::new();
        let mut forecasts = MockForecastStore::new();
        forecasts
            .expect_all_forecasts()
            .returning(|| Err(anyhow::anyhow!("connection reset")));
        let results = MockResultStore::new();

        let optimizer = optimizer_with(status_solver(SolveStatus::Optimal), None);
        let err = optimizer
            .run(&observations, &forecasts, &results)
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizationError::Store(_)));
    }

    async fn store_with_forecast_and_result() -> MemoryStore {
        let store = MemoryStore::new();
        store.replace_all(vec![existing_row()]).await.unwrap();
        store
            .replace_range(&MachineId::from("A"), ts(0), ts(0), vec![point("A", 0, 5.0)])
            .await
            .unwrap();
        store
    }

    fn observations_for_a() -> MockObservationStore {
        let mut observations = MockObservationStore::new();
        observations
            .expect_machine_specs()
            .returning(|_| Ok(vec![MachineSpec::new("A", 1.0, 10)]));
        observations
            .expect_hourly_energy_costs()
            .returning(|| Ok(Vec::new()));
        observations
    }

    #[tokio::test]
    async fn test_solve_timeout_leaves_results_untouched() {
        let store = store_with_forecast_and_result().await;

        let mut solver = MockLinearSolver::new();
        solver.expect_name().return_const("slow");
        solver.expect_solve().returning(|_| {
            std::thread::sleep(std::time::Duration::from_secs(2));
            SolveOutcome::failed(SolveStatus::Optimal)
        });
        let cfg = OptimizerConfig {
            solve_timeout_seconds: Some(1),
            ..OptimizerConfig::default()
        };
        let optimizer = ProductionOptimizer::new(cfg, Arc::new(solver));

        let err = optimizer
            .run(&observations_for_a(), &store, &store)
            .await
            .unwrap_err();
        match err {
            OptimizationError::InfeasibleOrSuboptimal(SolveStatus::Other(reason)) => {
                assert_eq!(reason, "timed out after 1s")
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.all_results().await.unwrap(), vec![existing_row()]);
    }

    #[tokio::test]
    async fn test_unavailable_solver_leaves_results_untouched() {
        let store = store_with_forecast_and_result().await;

        let optimizer = optimizer_with(status_solver(SolveStatus::Unavailable), None);
        let err = optimizer
            .run(&observations_for_a(), &store, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizationError::SolverUnavailable(_)));
        assert_eq!(store.all_results().await.unwrap(), vec![existing_row()]);
    }

    #[cfg(feature = "optimization")]
    mod solved {
        use super::*;
        use crate::domain::{HourlyCost, Observation};
        use crate::optimizer::GoodLpSolver;
        use proptest::prelude::*;

        fn specs() -> Vec<MachineSpec> {
            vec![MachineSpec::new("A", 1.0, 80), MachineSpec::new("B", 2.0, 80)]
        }

        fn value(plan: &ProductionPlan, machine: &str) -> f64 {
            plan.rows
                .iter()
                .find(|r| r.machine_id.as_str() == machine)
                .map(|r| r.optimized_production)
                .unwrap()
        }

        #[test]
        fn test_demand_below_limit_is_met() {
            let optimizer = optimizer_with(Arc::new(GoodLpSolver), None);
            let plan = optimizer
                .plan(&[point("A", 0, 50.0), point("B", 0, 60.0)], &specs(), &[])
                .unwrap();

            assert!((plan.plant_limit - 144.0).abs() < 1e-9);
            assert!((value(&plan, "A") - 50.0).abs() < 1e-6);
            assert!((value(&plan, "B") - 60.0).abs() < 1e-6);
        }

        #[test]
        fn test_tight_limit_fills_cheaper_machine_first() {
            let optimizer = optimizer_with(Arc::new(GoodLpSolver), Some(90.0));
            let plan = optimizer
                .plan(&[point("A", 0, 50.0), point("B", 0, 60.0)], &specs(), &[])
                .unwrap();

            assert!((value(&plan, "A") - 50.0).abs() < 1e-6);
            assert!((value(&plan, "B") - 40.0).abs() < 1e-6);
            let b = plan.rows.iter().find(|r| r.machine_id.as_str() == "B").unwrap();
            assert_eq!(b.baseline_production, 60);
            assert!((b.optimized_cost - 40.0 * 2.0 * 0.15).abs() < 1e-6);
            assert!(plan.optimized_cost() <= plan.baseline_cost() + 1e-9);
        }

        #[tokio::test]
        async fn test_run_replaces_result_set() {
            let obs: Vec<Observation> = ["A", "B"]
                .iter()
                .map(|m| Observation {
                    timestamp: ts(-1),
                    hour: 23,
                    machine_id: MachineId::from(*m),
                    energy_per_unit: 1.5,
                    production_demand: 30,
                    max_capacity: 50,
                    energy_cost: 0.2,
                })
                .collect();
            let store = MemoryStore::with_observations(obs);
            store.replace_all(vec![existing_row()]).await.unwrap();
            for m in ["A", "B"] {
                let rows = vec![point(m, 0, 30.0), point(m, 1, 70.0)];
                store
                    .replace_range(&MachineId::from(m), ts(0), ts(1), rows)
                    .await
                    .unwrap();
            }

            let optimizer = optimizer_with(Arc::new(GoodLpSolver), None);
            let summary = optimizer.run(&store, &store, &store).await.unwrap();

            let rows = store.all_results().await.unwrap();
            assert_eq!(rows.len(), 4);
            assert!(rows.iter().all(|r| r.machine_id.as_str() != "OLD"));
            assert_eq!(summary.machines, 2);
            assert!((summary.plant_limit - 90.0).abs() < 1e-9);
            // hour 1: both capped at 50, plant limit 90
            let hour1: f64 = rows
                .iter()
                .filter(|r| r.timestamp == ts(1))
                .map(|r| r.optimized_production)
                .sum();
            assert!(hour1 <= 90.0 + 1e-6);
        }

        #[test]
        fn test_price_curve_drives_allocation() {
            // Same energy use; A is cheap at hour 0 under per-machine pricing
            let cfg = OptimizerConfig {
                plant_capacity_limit: Some(10.0),
                cost_curve: crate::optimizer::CostCurveMode::PerMachine,
                ..OptimizerConfig::default()
            };
            let optimizer = ProductionOptimizer::new(cfg, Arc::new(GoodLpSolver));
            let costs = vec![
                HourlyCost { machine_id: "A".into(), hour: 0, avg_cost: 0.05, samples: 4 },
                HourlyCost { machine_id: "B".into(), hour: 0, avg_cost: 0.50, samples: 4 },
            ];
            let specs = vec![MachineSpec::new("A", 1.0, 20), MachineSpec::new("B", 1.0, 20)];
            let plan = optimizer
                .plan(&[point("A", 0, 10.0), point("B", 0, 10.0)], &specs, &costs)
                .unwrap();
            assert!((value(&plan, "A") - 10.0).abs() < 1e-6);
            assert!(value(&plan, "B").abs() < 1e-6);
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_solution_respects_bounds(
                caps in prop::collection::vec(1u32..100, 1..4),
                demand in prop::collection::vec(-10.0f64..150.0, 12),
                epu in prop::collection::vec(0.5f64..3.0, 4),
                factor in 0.1f64..1.0,
            ) {
                let specs: Vec<MachineSpec> = caps
                    .iter()
                    .enumerate()
                    .map(|(i, c)| MachineSpec::new(format!("M{i}"), epu[i], *c))
                    .collect();
                let hours = 3;
                let forecasts: Vec<ForecastPoint> = specs
                    .iter()
                    .enumerate()
                    .flat_map(|(i, s)| {
                        let demand = &demand;
                        (0..hours).map(move |h| ForecastPoint {
                            timestamp: ts(h as i64),
                            machine_id: s.machine_id.clone(),
                            predicted_demand: demand[i * hours + h],
                        })
                    })
                    .collect();

                let cfg = OptimizerConfig { plant_capacity_factor: factor, ..OptimizerConfig::default() };
                let plan = ProductionOptimizer::new(cfg, Arc::new(GoodLpSolver))
                    .plan(&forecasts, &specs, &[])
                    .unwrap();

                let limit = factor * caps.iter().map(|c| *c as f64).sum::<f64>();
                for r in &plan.rows {
                    let spec = specs.iter().find(|s| s.machine_id == r.machine_id).unwrap();
                    let f = forecasts
                        .iter()
                        .find(|p| p.machine_id == r.machine_id && p.timestamp == r.timestamp)
                        .unwrap();
                    prop_assert!(r.optimized_production >= 0.0);
                    prop_assert!(r.optimized_production <= spec.max_capacity as f64 + 1e-6);
                    prop_assert!(r.optimized_production <= f.predicted_demand.max(0.0) + 1e-6);
                }
                for h in 0..hours {
                    let total: f64 = plan
                        .rows
                        .iter()
                        .filter(|r| r.timestamp == ts(h as i64))
                        .map(|r| r.optimized_production)
                        .sum();
                    prop_assert!(total <= limit + 1e-6);
                }
            }
        }
    }
}
