//! Per-machine demand forecasting and energy-cost production scheduling
//!
//! Forecasts each machine's hourly demand with a fallback chain of
//! strategies, then solves one plant-wide linear program that allocates
//! production against those forecasts at minimal energy cost.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod optimizer;
pub mod repo;
#[cfg(feature = "sim")]
pub mod simulation;
pub mod telemetry;
