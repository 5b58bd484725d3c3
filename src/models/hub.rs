use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A fixed transit point that shipments bound for its city route through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitHub {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    /// Substring matched against a destination address.
    pub city_keyword: String,
}

impl TransitHub {
    pub fn matches_address(&self, address: &str) -> bool {
        !self.city_keyword.is_empty() && address.contains(&self.city_keyword)
    }
}

/// First hub, in the given order, whose keyword occurs in `address`.
pub fn match_hub<'a>(hubs: &'a [TransitHub], address: &str) -> Option<&'a TransitHub> {
    hubs.iter().find(|hub| hub.matches_address(address))
}
