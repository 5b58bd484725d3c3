use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::geo::GeoPoint;
use crate::models::{DeliveryRule, TransitHub};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// A transit hub seeded into the store at startup.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    #[validate(length(min = 1))]
    pub id: String,
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    /// Substring of a destination address that routes a shipment here
    #[validate(length(min = 1))]
    pub city_keyword: String,
}

impl HubConfig {
    pub fn to_hub(&self) -> TransitHub {
        TransitHub {
            id: self.id.clone(),
            name: self.name.clone(),
            location: GeoPoint::new(self.lat, self.lng),
            city_keyword: self.city_keyword.clone(),
        }
    }
}

/// A delivery area seeded into the store at startup.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeliveryRuleConfig {
    #[validate(length(min = 1))]
    pub id: String,
    pub name: String,
    /// Delivery-time bucket, e.g. "next-day" or "3-5 days"
    pub promised_duration: String,
    #[serde(default)]
    pub priority: i32,
    /// Polygon ring; at least three vertices
    #[validate(length(min = 3))]
    pub area: Vec<GeoPoint>,
}

impl DeliveryRuleConfig {
    pub fn to_rule(&self) -> DeliveryRule {
        DeliveryRule {
            id: self.id.clone(),
            name: self.name.clone(),
            promised_duration: self.promised_duration.clone(),
            priority: self.priority,
            area: self.area.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// `memory` for the in-process store, otherwise a sqlite:/postgres: URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// OSRM base URL; straight-line routing when unset
    #[serde(default)]
    pub routing_base_url: Option<String>,

    /// Per-request timeout for the route service
    #[validate(range(min = 1))]
    pub routing_timeout_ms: u64,

    /// Consecutive route-service failures before its circuit opens
    #[validate(range(min = 1))]
    pub routing_failure_threshold: u32,

    /// Seconds the route-service circuit stays open
    pub routing_reset_secs: u64,

    /// Simulation tick period
    #[validate(range(min = 1))]
    pub tick_interval_ms: u64,

    /// Unloading time at a hub before a shipment counts as arrived
    pub hub_settle_delay_ms: u64,

    /// Loading time between planning a batch and departure
    pub dispatch_settle_delay_ms: u64,

    /// Handover time at each last-mile stop
    pub handoff_delay_ms: u64,

    /// Shipments a hub needs before it dispatches a batch
    #[validate(range(min = 1))]
    pub hub_batch_threshold: usize,

    /// Minimum points per simulated leg
    #[validate(range(min = 2))]
    pub min_leg_steps: usize,

    /// Segment subdivisions for the straight-line fallback route
    #[validate(range(min = 1))]
    pub fallback_interpolation_steps: usize,

    /// Buffer size of each broadcast channel
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    pub hubs: Vec<HubConfig>,

    #[serde(default)]
    pub delivery_rules: Vec<DeliveryRuleConfig>,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// True when shipments live in process memory only.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.trim().eq_ignore_ascii_case("memory")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the seeded hubs and delivery rules entry by entry.
    fn validate_reference_data(&self) -> Result<(), validator::ValidationErrors> {
        for hub in &self.hubs {
            hub.validate()?;
        }
        for rule in &self.delivery_rules {
            rule.validate()?;
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "memory".into(),
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.into(),
            log_level: DEFAULT_LOG_LEVEL.into(),
            log_json: false,
            routing_base_url: None,
            routing_timeout_ms: 3_000,
            routing_failure_threshold: 5,
            routing_reset_secs: 60,
            tick_interval_ms: 5_000,
            hub_settle_delay_ms: 10_000,
            dispatch_settle_delay_ms: 5_000,
            handoff_delay_ms: 2_000,
            hub_batch_threshold: 3,
            min_leg_steps: 10,
            fallback_interpolation_steps: 10,
            event_channel_capacity: 1024,
            hubs: Vec::new(),
            delivery_rules: Vec::new(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!(
        "logistics_tracker={},tower_http=info,sea_orm=warn",
        level
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Built-in defaults, the lowest configuration layer.
pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = AppConfig::default();
    Config::builder()
        .set_default("database_url", d.database_url)?
        .set_default("host", d.host)?
        .set_default("port", i64::from(d.port))?
        .set_default("environment", d.environment)?
        .set_default("log_level", d.log_level)?
        .set_default("log_json", d.log_json)?
        .set_default("routing_timeout_ms", d.routing_timeout_ms)?
        .set_default("routing_failure_threshold", i64::from(d.routing_failure_threshold))?
        .set_default("routing_reset_secs", d.routing_reset_secs)?
        .set_default("tick_interval_ms", d.tick_interval_ms)?
        .set_default("hub_settle_delay_ms", d.hub_settle_delay_ms)?
        .set_default("dispatch_settle_delay_ms", d.dispatch_settle_delay_ms)?
        .set_default("handoff_delay_ms", d.handoff_delay_ms)?
        .set_default("hub_batch_threshold", d.hub_batch_threshold as u64)?
        .set_default("min_leg_steps", d.min_leg_steps as u64)?
        .set_default(
            "fallback_interpolation_steps",
            d.fallback_interpolation_steps as u64,
        )?
        .set_default("event_channel_capacity", d.event_channel_capacity as u64)
}

/// Deserializes and validates a built configuration.
pub fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config
        .validate()
        .and_then(|_| app_config.validate_reference_data())
        .map_err(|e| {
            error!("Configuration validation failed: {:?}", e);
            AppConfigError::Validation(e)
        })?;

    Ok(app_config)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = defaults()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config = finish(config)?;
    info!("Configuration loaded successfully");
    Ok(app_config)
}
