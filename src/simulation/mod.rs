//! Leg simulation: a single shared tick loop moving every active shipment
//! along its route and reporting progress to a [`LegObserver`].

use std::time::Duration;

use thiserror::Error;

use crate::config::AppConfig;

pub mod observer;
pub mod pace;
pub mod scheduler;

pub use observer::LegObserver;
pub use scheduler::{LegOutcome, LegStart, SimulationScheduler};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Route for order {0} is empty")]
    EmptyRoute(String),
    #[error("Order {0} already has an active leg")]
    LegAlreadyActive(String),
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Period of the shared tick; also the unit resumed legs are measured in.
    pub tick_interval: Duration,
    /// Lower bound on points per leg.
    pub min_leg_steps: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            min_leg_steps: 10,
        }
    }
}

impl From<&AppConfig> for SimulationSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            min_leg_steps: config.min_leg_steps,
        }
    }
}
