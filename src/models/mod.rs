pub mod delivery_rule;
pub mod hub;
pub mod shipment;
pub mod tracking;

pub use delivery_rule::DeliveryRule;
pub use hub::TransitHub;
pub use shipment::{NewShipment, Shipment, ShipmentStatus, StatusTimeline};
pub use tracking::TrackingRecord;
