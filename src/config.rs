use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use validator::Validate;

use crate::optimizer::CostCurveMode;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub forecast: ForecastConfig,
    #[validate(nested)]
    pub optimizer: OptimizerConfig,
    #[validate(nested)]
    pub simulation: SimulationConfig,
    #[validate(nested)]
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForecastConfig {
    /// Hours forecast per machine
    #[validate(range(min = 1, max = 168))]
    pub steps: usize,
    /// Input window of the sequence model
    #[validate(range(min = 1, max = 168))]
    pub window: usize,
    /// Training windows required on top of `window`
    #[validate(range(min = 1))]
    pub min_training_windows: usize,
    /// Minimum history for the ARIMA model
    #[validate(range(min = 3))]
    pub statistical_min_len: usize,
    /// Autoregressive order p of ARIMA(p,1,0)
    #[validate(range(min = 1, max = 24))]
    pub ar_order: usize,
    /// Machines forecast concurrently
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,
    pub sequence_enabled: bool,
    pub statistical_enabled: bool,
    #[validate(nested)]
    pub sequence: SequenceModelConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            steps: 24,
            window: 24,
            min_training_windows: 10,
            statistical_min_len: 30,
            ar_order: 5,
            workers: 4,
            sequence_enabled: true,
            statistical_enabled: true,
            sequence: SequenceModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SequenceModelConfig {
    #[validate(range(min = 1, max = 500))]
    pub n_trees: usize,
    #[validate(range(min = 1, max = 64))]
    pub max_depth: u16,
    pub seed: u64,
}

impl Default for SequenceModelConfig {
    fn default() -> Self {
        Self {
            n_trees: 30,
            max_depth: 8,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OptimizerConfig {
    /// Share of the summed machine capacities the plant may use per hour
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub plant_capacity_factor: f64,
    /// Absolute per-hour plant limit, overrides the factor when set
    #[validate(range(min = 0.0))]
    pub plant_capacity_limit: Option<f64>,
    /// Price used when no history exists for an hour
    #[validate(range(min = 0.0))]
    pub default_energy_cost: f64,
    /// Trailing window used to average machine specs
    #[validate(range(min = 1))]
    pub spec_window_hours: i64,
    pub cost_curve: CostCurveMode,
    /// Cost of one unit of forecast demand left unproduced; derived from the
    /// unit costs when unset
    #[validate(range(min = 0.0))]
    pub shortfall_penalty: Option<f64>,
    pub solve_timeout_seconds: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            plant_capacity_factor: 0.9,
            plant_capacity_limit: None,
            default_energy_cost: 0.15,
            spec_window_hours: 24,
            cost_curve: CostCurveMode::PlantWide,
            shortfall_penalty: None,
            solve_timeout_seconds: Some(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulationConfig {
    #[validate(range(min = 1, max = 1000))]
    pub machines: usize,
    #[validate(range(min = 1))]
    pub hours: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            machines: 10,
            hours: 24 * 14,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulerConfig {
    #[validate(range(min = 1))]
    pub run_every_minutes: u64,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_every_minutes: 60,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token for endpoints that trigger runs; empty disables them
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: Option<String>,
}

impl Config {
    /// Defaults, then the TOML file, then `PLANT__SECTION__KEY` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("PLANT__").split("__"));

        let cfg: Config = figment.extract().context("invalid configuration")?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Field ranges plus the cross-field rules validator can't express
    pub fn check(&self) -> Result<()> {
        self.validate().context("configuration out of range")?;
        anyhow::ensure!(
            self.forecast.statistical_min_len > self.forecast.ar_order + 1,
            "forecast.statistical_min_len ({}) must exceed ar_order + 1 ({})",
            self.forecast.statistical_min_len,
            self.forecast.ar_order + 1
        );
        Ok(())
    }
}
