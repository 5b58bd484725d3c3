#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use logistics_tracker::{
    clock::ManualClock,
    config::AppConfig,
    geo::GeoPoint,
    models::{DeliveryRule, Shipment, ShipmentStatus, TrackingRecord, TransitHub},
    routing::{RouteProvider, RoutingError},
    store::{InMemoryTrackingStore, TrackingStore},
    AppState,
};

pub const HUB_ID: &str = "H1";

pub fn hub_location() -> GeoPoint {
    GeoPoint::new(39.90, 116.40)
}

pub fn origin() -> GeoPoint {
    GeoPoint::new(39.00, 116.00)
}

/// Route service answering every request with an evenly spaced polyline.
pub struct LinearRouteProvider {
    pub points: usize,
}

#[async_trait]
impl RouteProvider for LinearRouteProvider {
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        let last = self.points - 1;
        Ok((0..self.points)
            .map(|i| match i {
                i if i == last => *destination,
                i => origin.lerp(destination, i as f64 / last as f64),
            })
            .collect())
    }
}

/// Route service that is always down.
pub struct DownRouteProvider;

#[async_trait]
impl RouteProvider for DownRouteProvider {
    async fn driving_path(
        &self,
        _origin: &GeoPoint,
        _destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        Err(RoutingError::Api("service unavailable".into()))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        tick_interval_ms: 5_000,
        hub_settle_delay_ms: 10_000,
        dispatch_settle_delay_ms: 5_000,
        handoff_delay_ms: 2_000,
        hub_batch_threshold: 3,
        min_leg_steps: 10,
        event_channel_capacity: 1024,
        ..AppConfig::default()
    }
}

/// Application wired around an in-memory store and a hand-driven clock.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<InMemoryTrackingStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new(routes: Arc<dyn RouteProvider>) -> Self {
        let store = Arc::new(InMemoryTrackingStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));

        store
            .upsert_hub(TransitHub {
                id: HUB_ID.into(),
                name: "Beijing Sorting Center".into(),
                location: hub_location(),
                city_keyword: "Beijing".into(),
            })
            .await
            .unwrap();
        store
            .upsert_delivery_rule(DeliveryRule {
                id: "R1".into(),
                name: "North China".into(),
                promised_duration: "next-day".into(),
                priority: 1,
                area: vec![
                    GeoPoint::new(30.0, 110.0),
                    GeoPoint::new(30.0, 125.0),
                    GeoPoint::new(45.0, 125.0),
                    GeoPoint::new(45.0, 110.0),
                ],
            })
            .await
            .unwrap();

        let state = AppState::from_parts(test_config(), store.clone(), routes, clock.clone());
        Self {
            state,
            store,
            clock,
        }
    }

    pub async fn add_shipment(&self, order_id: &str, destination: GeoPoint, address: &str) {
        self.store
            .create_shipment(Shipment::new(
                order_id,
                origin(),
                destination,
                address,
                self.clock_now(),
            ))
            .await
            .unwrap();
    }

    /// Runs `n` scheduler ticks and waits for their callbacks.
    pub async fn ticks(&self, n: usize) {
        for _ in 0..n {
            self.state.scheduler().tick();
        }
        self.state.scheduler().drain().await;
    }

    /// Lets tokio's paused clock run the dispatcher's delays.
    pub async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.state.scheduler().drain().await;
    }

    pub async fn status(&self, order_id: &str) -> ShipmentStatus {
        self.store
            .get_shipment(order_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    pub async fn store_shipment(&self, order_id: &str) -> Shipment {
        self.store.get_shipment(order_id).await.unwrap().unwrap()
    }

    pub async fn tracking(&self, order_id: &str) -> TrackingRecord {
        self.store.get_tracking(order_id).await.unwrap().unwrap()
    }

    pub async fn hub(&self) -> TransitHub {
        self.store.get_hub(HUB_ID).await.unwrap().unwrap()
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use logistics_tracker::clock::Clock;
        self.clock.now()
    }
}
