//! sea-orm entities backing [`crate::store::SqlTrackingStore`].

pub mod delivery_rule;
pub mod shipment;
pub mod tracking_point;
pub mod transit_hub;
