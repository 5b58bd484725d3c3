//! Driving-route lookup and route shaping.
//!
//! Route providers may fail or come back empty at any time. Callers go through
//! [`try_route`] and substitute a straight line themselves, so a routing
//! outage only degrades how the map looks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::config::AppConfig;
use crate::geo::GeoPoint;

pub mod osrm;
pub mod sampler;

pub use osrm::OsrmRouteProvider;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Route service error: {0}")]
    Api(String),
    #[error("Route service returned no route")]
    EmptyRoute,
    #[error("Route service circuit is open")]
    CircuitOpen,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Ordered polyline approximating a drivable path from `origin` to
    /// `destination`.
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError>;
}

/// Provider used when no route service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightLineProvider;

#[async_trait]
impl RouteProvider for StraightLineProvider {
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        Ok(sampler::straight_line(*origin, *destination))
    }
}

/// Wraps a provider in a circuit breaker so an unhealthy route service is
/// skipped until it has had time to recover.
#[derive(Debug)]
pub struct ResilientRouteProvider<P> {
    inner: P,
    breaker: CircuitBreaker,
}

impl<P: RouteProvider> ResilientRouteProvider<P> {
    pub fn new(inner: P, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new("route-service", config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<P: RouteProvider> RouteProvider for ResilientRouteProvider<P> {
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        let outcome = self
            .breaker
            .call(|| async {
                // A well-formed "no route" answer is not an outage.
                match self.inner.driving_path(origin, destination).await {
                    Err(RoutingError::EmptyRoute) => Ok(Vec::new()),
                    other => other,
                }
            })
            .await;

        match outcome {
            Ok(path) if path.is_empty() => Err(RoutingError::EmptyRoute),
            Ok(path) => Ok(path),
            Err(CircuitBreakerError::CircuitOpen) => Err(RoutingError::CircuitOpen),
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }
}

/// Asks `provider` for a path and logs instead of failing. `None` means the
/// caller should fall back to a straight line.
pub async fn try_route(
    provider: &dyn RouteProvider,
    origin: &GeoPoint,
    destination: &GeoPoint,
) -> Option<Vec<GeoPoint>> {
    match provider.driving_path(origin, destination).await {
        Ok(path) if !path.is_empty() => Some(path),
        Ok(_) | Err(RoutingError::EmptyRoute) => {
            warn!(%origin, %destination, "route service returned an empty path");
            None
        }
        Err(err) => {
            warn!(%origin, %destination, error = %err, "route request failed");
            None
        }
    }
}

/// Builds the provider described by the routing section of `config`.
pub fn provider_from_config(config: &AppConfig) -> Result<Arc<dyn RouteProvider>, RoutingError> {
    match config.routing_base_url.as_deref() {
        Some(base_url) if !base_url.trim().is_empty() => {
            info!("Routing via OSRM at {}", base_url);
            let osrm = OsrmRouteProvider::new(
                base_url,
                Duration::from_millis(config.routing_timeout_ms),
            )?;
            Ok(Arc::new(ResilientRouteProvider::new(
                osrm,
                CircuitBreakerConfig {
                    failure_threshold: config.routing_failure_threshold,
                    timeout: Duration::from_secs(config.routing_reset_secs),
                    success_threshold: 1,
                },
            )))
        }
        _ => {
            info!("No route service configured, using straight-line routes");
            Ok(Arc::new(StraightLineProvider))
        }
    }
}
