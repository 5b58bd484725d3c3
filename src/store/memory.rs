use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{StoreError, TrackingStore};
use crate::geo::GeoPoint;
use crate::models::{DeliveryRule, Shipment, ShipmentStatus, TrackingRecord, TransitHub};

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryTrackingStore {
    shipments: DashMap<String, Shipment>,
    tracking: DashMap<String, TrackingRecord>,
    hubs: DashMap<String, TransitHub>,
    rules: DashMap<String, DeliveryRule>,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn create_shipment(&self, shipment: Shipment) -> Result<Shipment, StoreError> {
        match self.shipments.entry(shipment.order_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(shipment.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(shipment.clone());
                Ok(shipment)
            }
        }
    }

    async fn get_shipment(&self, order_id: &str) -> Result<Option<Shipment>, StoreError> {
        Ok(self.shipments.get(order_id).map(|s| s.clone()))
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut shipment = self
            .shipments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        Ok(shipment.advance_status(status, at))
    }

    async fn assign_plan(
        &self,
        order_id: &str,
        promised_duration: &str,
        hub_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut shipment = self
            .shipments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        shipment.promised_duration = Some(promised_duration.to_string());
        shipment.hub_id = hub_id.map(str::to_string);
        Ok(())
    }

    async fn upsert_tracking_point(&self, record: TrackingRecord) -> Result<(), StoreError> {
        self.tracking.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn get_tracking(&self, order_id: &str) -> Result<Option<TrackingRecord>, StoreError> {
        Ok(self.tracking.get(order_id).map(|r| r.clone()))
    }

    async fn record_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self
            .tracking
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        record.position = position;
        record.recorded_at = at;
        Ok(())
    }

    async fn find_shipments_by_status(
        &self,
        statuses: &[ShipmentStatus],
    ) -> Result<Vec<Shipment>, StoreError> {
        let mut found: Vec<Shipment> = self
            .shipments
            .iter()
            .filter(|s| statuses.contains(&s.status))
            .map(|s| s.clone())
            .collect();
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(found)
    }

    async fn get_hub(&self, hub_id: &str) -> Result<Option<TransitHub>, StoreError> {
        Ok(self.hubs.get(hub_id).map(|h| h.clone()))
    }

    async fn list_hubs(&self) -> Result<Vec<TransitHub>, StoreError> {
        let mut hubs: Vec<TransitHub> = self.hubs.iter().map(|h| h.clone()).collect();
        hubs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hubs)
    }

    async fn upsert_hub(&self, hub: TransitHub) -> Result<(), StoreError> {
        self.hubs.insert(hub.id.clone(), hub);
        Ok(())
    }

    async fn list_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError> {
        let mut rules: Vec<DeliveryRule> = self.rules.iter().map(|r| r.clone()).collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn upsert_delivery_rule(&self, rule: DeliveryRule) -> Result<(), StoreError> {
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }
}
