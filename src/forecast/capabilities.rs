//! Startup probe of the advanced forecasting strategies
//!
//! Each strategy compiled into the binary is exercised once on a synthetic
//! series. The result is cached for the lifetime of the process and combined
//! with the configuration switches when an engine is built.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ForecastConfig;

static PROBED: Lazy<Capabilities> = Lazy::new(Capabilities::run_probe);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub sequence: bool,
    pub statistical: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        sequence: false,
        statistical: false,
    };

    /// Strategies usable in this process, probed on first call
    pub fn detect() -> Self {
        *PROBED
    }

    /// Probed capabilities restricted by configuration
    pub fn for_config(cfg: &ForecastConfig) -> Self {
        let probed = Self::detect();
        Self {
            sequence: probed.sequence && cfg.sequence_enabled,
            statistical: probed.statistical && cfg.statistical_enabled,
        }
    }

    fn run_probe() -> Self {
        let caps = Self {
            sequence: probe_sequence(),
            statistical: probe_statistical(),
        };
        info!(
            sequence = caps.sequence,
            statistical = caps.statistical,
            "forecasting capabilities probed"
        );
        caps
    }
}

fn probe_series() -> Vec<f64> {
    (0..48)
        .map(|h| 50.0 + 10.0 * (h as f64 / 24.0 * std::f64::consts::TAU).sin() + (h % 5) as f64)
        .collect()
}

#[cfg(feature = "ml")]
fn probe_sequence() -> bool {
    use super::{ForecastStrategy, SequenceStrategy};
    use crate::config::SequenceModelConfig;

    let strategy = SequenceStrategy::new(
        8,
        4,
        SequenceModelConfig {
            n_trees: 2,
            max_depth: 3,
            seed: 0,
        },
    );
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        strategy.fit_and_forecast(&probe_series(), 2)
    })) {
        Ok(Ok(out)) if out.len() == 2 => true,
        Ok(Ok(_)) => {
            warn!("sequence strategy probe returned wrong length; disabled");
            false
        }
        Ok(Err(e)) => {
            warn!(error = %e, "sequence strategy probe failed; disabled");
            false
        }
        Err(_) => {
            warn!("sequence strategy probe panicked; disabled");
            false
        }
    }
}

#[cfg(not(feature = "ml"))]
fn probe_sequence() -> bool {
    false
}

#[cfg(feature = "stats")]
fn probe_statistical() -> bool {
    use super::{ForecastStrategy, StatisticalStrategy};

    match StatisticalStrategy::new(2, 10).fit_and_forecast(&probe_series(), 2) {
        Ok(out) => out.len() == 2,
        Err(e) => {
            warn!(error = %e, "statistical strategy probe failed; disabled");
            false
        }
    }
}

#[cfg(not(feature = "stats"))]
fn probe_statistical() -> bool {
    false
}
