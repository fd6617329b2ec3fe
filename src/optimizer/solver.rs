//! Boundary between the production model and an LP backend

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::LinearProgram;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Unavailable,
    Other(String),
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => f.write_str("optimal"),
            Self::Infeasible => f.write_str("infeasible"),
            Self::Unbounded => f.write_str("unbounded"),
            Self::Unavailable => f.write_str("unavailable"),
            Self::Other(reason) => write!(f, "other ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per variable, empty unless optimal
    pub values: Vec<f64>,
    pub objective: Option<f64>,
}

impl SolveOutcome {
    pub fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective: None,
        }
    }
}

/// Synchronous LP solver; callers move it to the blocking pool
#[cfg_attr(test, mockall::automock)]
pub trait LinearSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, program: &LinearProgram) -> SolveOutcome;
}

/// good_lp backed solver using the pure-Rust minilp simplex
#[cfg(feature = "optimization")]
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

#[cfg(feature = "optimization")]
impl LinearSolver for GoodLpSolver {
    fn name(&self) -> &'static str {
        "good_lp/minilp"
    }

    fn solve(&self, program: &LinearProgram) -> SolveOutcome {
        use good_lp::{
            constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError,
            Solution, SolverModel, Variable,
        };

        use super::ConstraintSense;

        let mut vars = ProblemVariables::new();
        let xs: Vec<Variable> = program
            .variables
            .iter()
            .map(|b| vars.add(variable().min(b.lower).max(b.upper)))
            .collect();

        let objective: Expression = program
            .objective
            .iter()
            .zip(&xs)
            .map(|(c, x)| *c * *x)
            .sum();

        let mut model = vars.minimise(objective).using(default_solver);
        for c in &program.constraints {
            let lhs: Expression = c.terms.iter().map(|(i, coef)| *coef * xs[*i]).sum();
            let rhs = c.rhs;
            model = match c.sense {
                ConstraintSense::LessEq => model.with(constraint!(lhs <= rhs)),
                ConstraintSense::GreaterEq => model.with(constraint!(lhs >= rhs)),
                ConstraintSense::Equal => model.with(constraint!(lhs == rhs)),
            };
        }

        match model.solve() {
            Ok(solution) => {
                let values: Vec<f64> = xs.iter().map(|x| solution.value(*x)).collect();
                let objective = program.objective_value(&values);
                SolveOutcome {
                    status: SolveStatus::Optimal,
                    values,
                    objective: Some(objective),
                }
            }
            Err(ResolutionError::Infeasible) => SolveOutcome::failed(SolveStatus::Infeasible),
            Err(ResolutionError::Unbounded) => SolveOutcome::failed(SolveStatus::Unbounded),
            Err(e) => SolveOutcome::failed(SolveStatus::Other(e.to_string())),
        }
    }
}

/// Stand-in when no LP backend is compiled in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSolver;

impl LinearSolver for UnavailableSolver {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn solve(&self, _program: &LinearProgram) -> SolveOutcome {
        SolveOutcome::failed(SolveStatus::Unavailable)
    }
}

/// Best solver compiled into this build
pub fn default_linear_solver() -> Arc<dyn LinearSolver> {
    #[cfg(feature = "optimization")]
    {
        Arc::new(GoodLpSolver)
    }
    #[cfg(not(feature = "optimization"))]
    {
        tracing::warn!("built without the `optimization` feature; optimization runs will fail");
        Arc::new(UnavailableSolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_solver() {
        let out = UnavailableSolver.solve(&LinearProgram::default());
        assert_eq!(out.status, SolveStatus::Unavailable);
        assert!(out.values.is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::Infeasible.to_string(), "infeasible");
        assert_eq!(
            SolveStatus::Other("timed out".into()).to_string(),
            "other (timed out)"
        );
    }

    #[cfg(feature = "optimization")]
    mod good_lp_backend {
        use super::super::*;
        use crate::optimizer::ConstraintSense;

        #[test]
        fn test_prefers_cheaper_variable() {
            let mut lp = LinearProgram::default();
            let x = lp.add_variable(0.0, 10.0, -1.0);
            let y = lp.add_variable(0.0, 10.0, -3.0);
            lp.add_constraint(vec![(x, 1.0), (y, 1.0)], ConstraintSense::LessEq, 12.0);

            let out = GoodLpSolver.solve(&lp);
            assert_eq!(out.status, SolveStatus::Optimal);
            assert!((out.values[y] - 10.0).abs() < 1e-6);
            assert!((out.values[x] - 2.0).abs() < 1e-6);
            assert!((out.objective.unwrap() + 32.0).abs() < 1e-6);
        }

        #[test]
        fn test_reports_infeasible() {
            let mut lp = LinearProgram::default();
            let x = lp.add_variable(0.0, 1.0, 1.0);
            lp.add_constraint(vec![(x, 1.0)], ConstraintSense::GreaterEq, 5.0);

            assert_eq!(GoodLpSolver.solve(&lp).status, SolveStatus::Infeasible);
        }

        #[test]
        fn test_equality_constraint() {
            let mut lp = LinearProgram::default();
            let x = lp.add_variable(0.0, 10.0, 1.0);
            let y = lp.add_variable(0.0, 10.0, 2.0);
            lp.add_constraint(vec![(x, 1.0), (y, 1.0)], ConstraintSense::Equal, 15.0);

            let out = GoodLpSolver.solve(&lp);
            assert!(lp.is_feasible(&out.values, 1e-6));
            assert!((out.values[x] - 10.0).abs() < 1e-6);
        }
    }
}
