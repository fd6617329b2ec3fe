use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use super::SolveStatus;

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("no forecasts available to optimize")]
    NoForecasts,

    #[error("no machine specs available for the forecast machines")]
    NoMachineSpecs,

    #[error("LP solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("solver did not reach an optimal solution: {0}")]
    InfeasibleOrSuboptimal(SolveStatus),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl OptimizationError {
    /// Stable name used in logs and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoForecasts => "NoForecasts",
            Self::NoMachineSpecs => "NoMachineSpecs",
            Self::SolverUnavailable(_) => "SolverUnavailable",
            Self::InfeasibleOrSuboptimal(_) => "InfeasibleOrSuboptimal",
            Self::Store(_) => "Store",
        }
    }
}

/// Stages of an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    Fetching,
    BuildingModel,
    Solving,
    Persisting,
    Failed,
}
