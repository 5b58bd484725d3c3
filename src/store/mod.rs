//! Durable shipment and tracking state.
//!
//! [`TrackingStore`] is the only persistence surface the scheduler and
//! dispatch flows touch. Two implementations ship with the crate: a
//! `dashmap`-backed store for tests and demo runs, and a sea-orm store for
//! SQLite/Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geo::GeoPoint;
use crate::models::hub::match_hub;
use crate::models::{DeliveryRule, Shipment, ShipmentStatus, TrackingRecord, TransitHub};

pub mod memory;
pub mod sql;

pub use memory::InMemoryTrackingStore;
pub use sql::SqlTrackingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Duplicate(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError::Database(err.to_string())
    }
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Inserts a new shipment; fails with [`StoreError::Duplicate`] if the
    /// order id is taken.
    async fn create_shipment(&self, shipment: Shipment) -> Result<Shipment, StoreError>;

    async fn get_shipment(&self, order_id: &str) -> Result<Option<Shipment>, StoreError>;

    /// Advances the shipment to `status`, stamping `at` for that status.
    ///
    /// Returns `Ok(false)` without touching the row when `status` does not rank
    /// above the current one.
    async fn update_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Records the ship-time decisions: matched delivery bucket and hub.
    async fn assign_plan(
        &self,
        order_id: &str,
        promised_duration: &str,
        hub_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Inserts or replaces the tracking record keyed by its order id.
    async fn upsert_tracking_point(&self, record: TrackingRecord) -> Result<(), StoreError>;

    async fn get_tracking(&self, order_id: &str) -> Result<Option<TrackingRecord>, StoreError>;

    /// Moves the stored vehicle position without touching the route.
    async fn record_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Shipments in any of `statuses`, oldest first.
    async fn find_shipments_by_status(
        &self,
        statuses: &[ShipmentStatus],
    ) -> Result<Vec<Shipment>, StoreError>;

    async fn get_hub(&self, hub_id: &str) -> Result<Option<TransitHub>, StoreError>;

    /// Hubs ordered by id.
    async fn list_hubs(&self) -> Result<Vec<TransitHub>, StoreError>;

    async fn upsert_hub(&self, hub: TransitHub) -> Result<(), StoreError>;

    /// Rules ordered by ascending priority.
    async fn list_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError>;

    async fn upsert_delivery_rule(&self, rule: DeliveryRule) -> Result<(), StoreError>;

    /// First hub (by id) whose city keyword occurs in `address`.
    async fn find_hub_by_address_keyword(
        &self,
        address: &str,
    ) -> Result<Option<TransitHub>, StoreError> {
        let hubs = self.list_hubs().await?;
        Ok(match_hub(&hubs, address).cloned())
    }
}
