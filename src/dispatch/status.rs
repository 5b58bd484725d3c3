use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::ServiceError;
use crate::events::{NotificationSink, StatusUpdate, TrackingEvent};
use crate::models::ShipmentStatus;
use crate::store::TrackingStore;

/// Persists status transitions and announces the ones that took effect.
#[derive(Clone)]
pub struct StatusRecorder {
    store: Arc<dyn TrackingStore>,
    sink: Arc<dyn NotificationSink>,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn TrackingStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Advances `order_id` to `status`. Returns `false` when the shipment was
    /// already at or past it, in which case nothing is published.
    pub async fn record(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        if !self.store.update_status(order_id, status, at).await? {
            debug!(order_id, %status, "status unchanged");
            return Ok(false);
        }

        let shipment = self
            .store
            .get_shipment(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Shipment {}", order_id)))?;

        let update = StatusUpdate {
            order_id: order_id.to_string(),
            status,
            ts: at,
            timeline: shipment.timeline,
        };
        self.sink
            .publish_order(order_id, TrackingEvent::Status(update.clone()));
        self.sink.publish_global(TrackingEvent::Status(update));

        info!(order_id, %status, "shipment status advanced");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::geo::GeoPoint;
    use crate::models::Shipment;
    use crate::store::InMemoryTrackingStore;

    #[tokio::test]
    async fn publishes_only_real_transitions() {
        let store = Arc::new(InMemoryTrackingStore::new());
        let hub = Arc::new(EventHub::new(16));
        store
            .create_shipment(Shipment::new(
                "O1",
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(1.0, 1.0),
                "Somewhere",
                Utc::now(),
            ))
            .await
            .unwrap();
        let recorder = StatusRecorder::new(store.clone(), hub.clone());
        let mut order_rx = hub.subscribe("O1");
        let mut global_rx = hub.subscribe_global();

        let at = Utc::now();
        assert!(recorder.record("O1", ShipmentStatus::Picked, at).await.unwrap());
        assert!(!recorder.record("O1", ShipmentStatus::Picked, at).await.unwrap());

        match order_rx.recv().await.unwrap() {
            TrackingEvent::Status(update) => {
                assert_eq!(update.status, ShipmentStatus::Picked);
                assert_eq!(update.timeline.picked_at, Some(at));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(order_rx.try_recv().is_err());
        assert!(matches!(global_rx.recv().await.unwrap(), TrackingEvent::Status(_)));
    }
}
