use serde::{Deserialize, Serialize};

use crate::geo::{point_in_polygon, GeoPoint};

/// A delivery area and the promised delivery-time bucket for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRule {
    pub id: String,
    pub name: String,
    /// e.g. "next-day", "1-2 days", "3-5 days"
    pub promised_duration: String,
    /// Lower values are matched first.
    #[serde(default)]
    pub priority: i32,
    pub area: Vec<GeoPoint>,
}

impl DeliveryRule {
    pub fn covers(&self, point: &GeoPoint) -> bool {
        point_in_polygon(point, &self.area)
    }
}

/// Lowest-priority-value rule whose area contains `destination`.
pub fn match_rule<'a>(rules: &'a [DeliveryRule], destination: &GeoPoint) -> Option<&'a DeliveryRule> {
    rules
        .iter()
        .filter(|rule| rule.covers(destination))
        .min_by_key(|rule| rule.priority)
}
