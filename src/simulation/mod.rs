//! # Synthetic Plant History
//!
//! Generates hourly observations for a plant of machines so the pipeline can
//! run without a real data feed.
//!
//! - **Profiles**: per machine energy use (1.5-4.0 kWh/unit) and capacity (40-120 units/h)
//! - **Demand**: daily sine cycle times a random utilisation, with rare spikes
//! - **Prices**: peak tariff from 09:00 to 21:00, off-peak otherwise

pub mod plant;

pub use plant::{energy_cost_at, MachineProfile, PlantSimulator};
