use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ServiceError;
use crate::geo::GeoPoint;
use crate::models::ShipmentStatus;

/// Hooks a running leg reports into.
///
/// The scheduler calls these from the leg's own lane, one at a time and in
/// the order the leg produced them. Errors are logged by the scheduler and
/// never stop the leg.
#[async_trait]
pub trait LegObserver: Send + Sync {
    /// The vehicle reached `position` at `at`.
    async fn on_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// A milestone was crossed: `picked` when the leg departs, then
    /// `in_transit`, `out_for_delivery`, and [`terminal_status`] on
    /// completion.
    ///
    /// [`terminal_status`]: LegObserver::terminal_status
    async fn on_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// The leg reached the end of its route.
    async fn on_complete(&self, order_id: &str) -> Result<(), ServiceError>;

    /// Status reported just before [`on_complete`]; `None` for legs that end
    /// somewhere other than the final destination.
    ///
    /// [`on_complete`]: LegObserver::on_complete
    fn terminal_status(&self) -> Option<ShipmentStatus> {
        Some(ShipmentStatus::Signed)
    }
}
