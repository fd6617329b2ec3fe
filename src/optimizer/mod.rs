//! Plant-wide production optimization
//!
//! Forecasts, machine specs and the price curve are turned into one LP per
//! run. An optimal solution is reconciled against the capacity-bounded
//! baseline and replaces the whole result set.

pub mod engine;
pub mod error;
pub mod model;
pub mod price_curve;
pub mod solver;

pub use engine::*;
pub use error::*;
pub use model::*;
pub use price_curve::*;
pub use solver::*;
