//! The three kinds of leg the dispatcher puts on the scheduler.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::status::StatusRecorder;
use super::DispatchOrchestrator;
use crate::errors::ServiceError;
use crate::events::{NotificationSink, PositionUpdate, TrackingEvent};
use crate::geo::GeoPoint;
use crate::models::ShipmentStatus;
use crate::simulation::LegObserver;
use crate::store::TrackingStore;

fn orchestrator(handle: &Weak<DispatchOrchestrator>) -> Result<Arc<DispatchOrchestrator>, ServiceError> {
    handle
        .upgrade()
        .ok_or_else(|| ServiceError::InternalError("dispatcher has shut down".to_string()))
}

/// Sender straight to the recipient; the leg ends with the shipment signed.
pub struct DirectLegObserver {
    store: Arc<dyn TrackingStore>,
    statuses: StatusRecorder,
}

impl DirectLegObserver {
    pub fn new(store: Arc<dyn TrackingStore>, statuses: StatusRecorder) -> Self {
        Self { store, statuses }
    }
}

#[async_trait]
impl LegObserver for DirectLegObserver {
    async fn on_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.store.record_position(order_id, position, at).await?;
        Ok(())
    }

    async fn on_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.statuses.record(order_id, status, at).await.map(|_| ())
    }

    async fn on_complete(&self, order_id: &str) -> Result<(), ServiceError> {
        info!(order_id, "delivered");
        Ok(())
    }
}

/// Sender to a transit hub. Arrival hands the shipment to the dispatcher
/// instead of signing it.
pub struct HubLegObserver {
    store: Arc<dyn TrackingStore>,
    statuses: StatusRecorder,
    orchestrator: Weak<DispatchOrchestrator>,
}

impl HubLegObserver {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        statuses: StatusRecorder,
        orchestrator: Weak<DispatchOrchestrator>,
    ) -> Self {
        Self {
            store,
            statuses,
            orchestrator,
        }
    }
}

#[async_trait]
impl LegObserver for HubLegObserver {
    async fn on_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.store.record_position(order_id, position, at).await?;
        Ok(())
    }

    async fn on_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        // Out-for-delivery belongs to the last mile; the first leg tops out
        // at in-transit so the later hub arrival is still a forward move.
        if !status.can_advance_to(ShipmentStatus::ArrivedAtHub) {
            debug!(order_id, %status, "first-leg milestone left to the last mile");
            return Ok(());
        }
        self.statuses.record(order_id, status, at).await.map(|_| ())
    }

    async fn on_complete(&self, order_id: &str) -> Result<(), ServiceError> {
        orchestrator(&self.orchestrator)?.schedule_hub_arrival(order_id);
        Ok(())
    }

    fn terminal_status(&self) -> Option<ShipmentStatus> {
        None
    }
}

/// One stop of a chained last-mile run.
///
/// The truck's live position is mirrored onto every later stop of the same
/// run so recipients can watch it approach. Statuses are left alone: every
/// stop stays `out_for_delivery` until the dispatcher signs it off.
pub struct ChainLegObserver {
    store: Arc<dyn TrackingStore>,
    sink: Arc<dyn NotificationSink>,
    orchestrator: Weak<DispatchOrchestrator>,
    batch_id: Uuid,
    later_stops: Vec<String>,
}

impl ChainLegObserver {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        sink: Arc<dyn NotificationSink>,
        orchestrator: Weak<DispatchOrchestrator>,
        batch_id: Uuid,
        later_stops: Vec<String>,
    ) -> Self {
        Self {
            store,
            sink,
            orchestrator,
            batch_id,
            later_stops,
        }
    }
}

#[async_trait]
impl LegObserver for ChainLegObserver {
    async fn on_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let current = self.store.record_position(order_id, position, at).await;

        for stop in &self.later_stops {
            if let Err(err) = self.store.record_position(stop, position, at).await {
                warn!(order_id = %stop, error = %err, "failed to mirror truck position");
            }
            self.sink.publish_order(
                stop,
                TrackingEvent::Position(PositionUpdate::new(stop.as_str(), position, at)),
            );
        }

        current.map_err(ServiceError::from)
    }

    async fn on_status(
        &self,
        _order_id: &str,
        _status: ShipmentStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn on_complete(&self, order_id: &str) -> Result<(), ServiceError> {
        orchestrator(&self.orchestrator)?.schedule_handoff(self.batch_id, order_id);
        Ok(())
    }

    fn terminal_status(&self) -> Option<ShipmentStatus> {
        None
    }
}
