use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Latest persisted tracking state for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub order_id: String,
    pub position: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub pace: String,
    /// JSON-encoded cumulative route (every leg travelled or planned so far).
    pub route_path: String,
    /// Number of leading route points that make up the first leg, from the
    /// sender to the hub or recipient. Later legs are composed after it.
    pub first_leg_len: usize,
    /// Index into the cumulative route where the active leg begins.
    pub leg_offset: usize,
    /// When the active leg began moving; `None` while it waits to depart.
    pub leg_started_at: Option<DateTime<Utc>>,
}

impl TrackingRecord {
    pub fn new(
        order_id: impl Into<String>,
        position: GeoPoint,
        recorded_at: DateTime<Utc>,
        pace: impl Into<String>,
        route: &[GeoPoint],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            order_id: order_id.into(),
            position,
            recorded_at,
            pace: pace.into(),
            route_path: encode_route(route)?,
            first_leg_len: route.len(),
            leg_offset: 0,
            leg_started_at: Some(recorded_at),
        })
    }

    pub fn route(&self) -> Result<Vec<GeoPoint>, serde_json::Error> {
        decode_route(&self.route_path)
    }

    /// The first leg alone, without any last mile planned after it.
    pub fn first_leg(&self) -> Result<Vec<GeoPoint>, serde_json::Error> {
        let mut route = self.route()?;
        route.truncate(self.first_leg_len);
        Ok(route)
    }

    /// The part of the cumulative route belonging to the active leg.
    pub fn active_leg(&self) -> Result<Vec<GeoPoint>, serde_json::Error> {
        let mut route = self.route()?;
        let offset = self.leg_offset.min(route.len());
        Ok(route.split_off(offset))
    }
}

pub fn encode_route(route: &[GeoPoint]) -> Result<String, serde_json::Error> {
    serde_json::to_string(route)
}

pub fn decode_route(raw: &str) -> Result<Vec<GeoPoint>, serde_json::Error> {
    serde_json::from_str(raw)
}
