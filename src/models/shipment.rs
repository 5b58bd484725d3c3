use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use validator::Validate;

use crate::geo::GeoPoint;

/// Delivery lifecycle of an order. Variants are declared in lifecycle order
/// and a shipment only ever moves forward through them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Picked,
    InTransit,
    ArrivedAtHub,
    OutForDelivery,
    Signed,
}

impl ShipmentStatus {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// True when moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: ShipmentStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Statuses whose simulation leg is in flight and must be resumed after a
    /// restart.
    pub fn in_flight() -> [ShipmentStatus; 3] {
        [
            ShipmentStatus::Picked,
            ShipmentStatus::InTransit,
            ShipmentStatus::OutForDelivery,
        ]
    }
}

/// Per-status timestamps. Each is written the first time its status is
/// reached and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusTimeline {
    pub picked_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub arrived_at_hub_at: Option<DateTime<Utc>>,
    pub out_for_delivery_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl StatusTimeline {
    fn slot(&mut self, status: ShipmentStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            ShipmentStatus::Pending => None,
            ShipmentStatus::Picked => Some(&mut self.picked_at),
            ShipmentStatus::InTransit => Some(&mut self.in_transit_at),
            ShipmentStatus::ArrivedAtHub => Some(&mut self.arrived_at_hub_at),
            ShipmentStatus::OutForDelivery => Some(&mut self.out_for_delivery_at),
            ShipmentStatus::Signed => Some(&mut self.signed_at),
        }
    }

    /// Records `at` for `status` unless a timestamp is already present.
    pub fn stamp(&mut self, status: ShipmentStatus, at: DateTime<Utc>) {
        if let Some(slot) = self.slot(status) {
            slot.get_or_insert(at);
        }
    }
}

/// One order's delivery lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub order_id: String,
    pub status: ShipmentStatus,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub destination_address: String,
    /// Delivery-time bucket from the matched delivery rule, set at ship time.
    pub promised_duration: Option<String>,
    /// Transit hub assigned at ship time, if the destination matched one.
    pub hub_id: Option<String>,
    pub timeline: StatusTimeline,
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        order_id: impl Into<String>,
        origin: GeoPoint,
        destination: GeoPoint,
        destination_address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status: ShipmentStatus::Pending,
            origin,
            destination,
            destination_address: destination_address.into(),
            promised_duration: None,
            hub_id: None,
            timeline: StatusTimeline::default(),
            created_at,
        }
    }

    /// Moves the shipment to `status` if that is a forward transition.
    ///
    /// Returns `false` and leaves the shipment untouched otherwise, which makes
    /// repeated writes of the same status harmless.
    pub fn advance_status(&mut self, status: ShipmentStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_advance_to(status) {
            return false;
        }
        self.status = status;
        self.timeline.stamp(status, at);
        true
    }
}

/// Request payload for registering a new pending shipment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewShipment {
    #[validate(length(min = 1, max = 64, message = "order_id must be 1-64 characters"))]
    pub order_id: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub origin_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub origin_lng: f64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub destination_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub destination_lng: f64,
    #[validate(length(min = 1, max = 255, message = "destination_address must be 1-255 characters"))]
    pub destination_address: String,
}

impl NewShipment {
    pub fn into_shipment(self, created_at: DateTime<Utc>) -> Shipment {
        Shipment::new(
            self.order_id,
            GeoPoint::new(self.origin_lat, self.origin_lng),
            GeoPoint::new(self.destination_lat, self.destination_lng),
            self.destination_address,
            created_at,
        )
    }
}
