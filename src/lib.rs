//! Logistics Tracker Library
//!
//! Order tracking backend: simulates shipments driving along planned routes,
//! batches last-mile dispatch at transit hubs and streams live positions to
//! subscribers.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod entities;
pub mod errors;
pub mod events;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod routing;
pub mod simulation;
pub mod store;

use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::dispatch::{DispatchOrchestrator, DispatchSettings};
use crate::events::EventHub;
use crate::routing::RouteProvider;
use crate::simulation::{SimulationScheduler, SimulationSettings};
use crate::store::{InMemoryTrackingStore, SqlTrackingStore, StoreError, TrackingStore};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TrackingStore>,
    pub events: Arc<EventHub>,
    pub orchestrator: Arc<DispatchOrchestrator>,
}

impl AppState {
    /// Wires store, route provider, scheduler and orchestrator from `config`.
    pub async fn build(
        config: AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, errors::ServiceError> {
        let store = build_store(&config).await?;
        seed_reference_data(store.as_ref(), &config).await?;
        let routes = routing::provider_from_config(&config)?;
        Ok(Self::from_parts(config, store, routes, clock))
    }

    /// Assembles the service around already-built collaborators.
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn TrackingStore>,
        routes: Arc<dyn RouteProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = Arc::new(EventHub::new(config.event_channel_capacity));
        let scheduler = Arc::new(SimulationScheduler::new(
            SimulationSettings::from(&config),
            events.clone(),
            clock.clone(),
        ));
        let orchestrator = DispatchOrchestrator::new(
            DispatchSettings::from(&config),
            store.clone(),
            routes,
            scheduler,
            events.clone(),
            clock,
        );

        Self {
            config: Arc::new(config),
            store,
            events,
            orchestrator,
        }
    }

    pub fn scheduler(&self) -> &Arc<SimulationScheduler> {
        self.orchestrator.scheduler()
    }
}

/// Opens the store selected by `database_url`.
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn TrackingStore>, StoreError> {
    if config.uses_memory_store() {
        info!("Using in-memory tracking store");
        return Ok(Arc::new(InMemoryTrackingStore::new()));
    }
    let store = SqlTrackingStore::connect(&config.database_url).await?;
    info!("Connected to tracking database");
    Ok(Arc::new(store))
}

/// Upserts the hubs and delivery rules listed in configuration.
pub async fn seed_reference_data(
    store: &dyn TrackingStore,
    config: &AppConfig,
) -> Result<(), StoreError> {
    for hub in &config.hubs {
        store.upsert_hub(hub.to_hub()).await?;
    }
    for rule in &config.delivery_rules {
        store.upsert_delivery_rule(rule.to_rule()).await?;
    }
    info!(
        hubs = config.hubs.len(),
        delivery_rules = config.delivery_rules.len(),
        "Reference data seeded"
    );
    Ok(())
}

/// Full HTTP surface: health probe plus the v1 API.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", handlers::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;
