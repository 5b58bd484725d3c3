use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::geo::GeoPoint;
use crate::models::{ShipmentStatus, StatusTimeline};

/// Live vehicle position for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub order_id: String,
    pub lat: f64,
    pub lng: f64,
    pub ts: DateTime<Utc>,
}

impl PositionUpdate {
    pub fn new(order_id: impl Into<String>, point: GeoPoint, ts: DateTime<Utc>) -> Self {
        Self {
            order_id: order_id.into(),
            lat: point.lat,
            lng: point.lng,
            ts,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Status change together with every milestone timestamp recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub order_id: String,
    pub status: ShipmentStatus,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub timeline: StatusTimeline,
}

/// Replacement polyline for an order; redraws the route rather than moving
/// the vehicle marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub order_id: String,
    pub route_path: Vec<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TrackingEvent {
    Position(PositionUpdate),
    Status(StatusUpdate),
    Route(RouteUpdate),
    /// Every position emitted during one scheduler tick.
    PositionBatch(Vec<PositionUpdate>),
}

/// Fan-out of tracking events to per-order and global listeners.
///
/// Delivery is best effort: publishing never blocks and events published with
/// nobody listening are dropped.
pub trait NotificationSink: Send + Sync {
    fn publish_order(&self, order_id: &str, event: TrackingEvent);
    fn publish_global(&self, event: TrackingEvent);
}

/// Broadcast-channel backed [`NotificationSink`].
#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    orders: DashMap<String, broadcast::Sender<TrackingEvent>>,
    global: broadcast::Sender<TrackingEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        Self {
            capacity,
            orders: DashMap::new(),
            global,
        }
    }

    /// Joins the channel for `order_id`, creating it on first use.
    pub fn subscribe(&self, order_id: &str) -> broadcast::Receiver<TrackingEvent> {
        self.orders
            .entry(order_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<TrackingEvent> {
        self.global.subscribe()
    }

    /// Number of order channels that currently exist.
    pub fn channel_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for EventHub {
    fn publish_order(&self, order_id: &str, event: TrackingEvent) {
        let delivered = match self.orders.get(order_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => return,
        };

        if !delivered {
            // Everyone left; drop the channel so idle orders do not accumulate.
            self.orders
                .remove_if(order_id, |_, sender| sender.receiver_count() == 0);
            debug!(order_id, "pruned order channel without subscribers");
        }
    }

    fn publish_global(&self, event: TrackingEvent) {
        let _ = self.global.send(event);
    }
}
