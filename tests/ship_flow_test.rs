//! Ship-time decisions and the direct-delivery leg.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{DownRouteProvider, Harness, LinearRouteProvider};
use logistics_tracker::errors::ServiceError;
use logistics_tracker::events::TrackingEvent;
use logistics_tracker::geo::GeoPoint;
use logistics_tracker::models::ShipmentStatus;
use logistics_tracker::routing::{RouteProvider, RoutingError};

const STEPS: usize = 12;

fn tianjin() -> GeoPoint {
    GeoPoint::new(39.12, 117.20)
}

#[tokio::test(start_paused = true)]
async fn direct_shipment_walks_every_status_in_order() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 40 })).await;
    h.add_shipment("D1", tianjin(), "5 Heping Rd, Tianjin").await;
    let mut events = h.state.events.subscribe("D1");

    let plan = h.state.orchestrator.ship("D1").await.unwrap();
    assert_eq!(plan.promised_duration, "next-day");
    assert_eq!(plan.hub_id, None);
    assert_eq!(plan.steps, STEPS);

    h.ticks(STEPS + 1).await;
    assert!(!h.state.scheduler().is_active("D1"));

    let mut statuses = Vec::new();
    let mut positions = 0;
    let mut routes = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            TrackingEvent::Status(update) => statuses.push(update.status),
            TrackingEvent::Position(_) => positions += 1,
            TrackingEvent::Route(update) => {
                assert_eq!(update.route_path.len(), STEPS);
                routes += 1;
            }
            TrackingEvent::PositionBatch(_) => panic!("batches belong on the global channel"),
        }
    }
    assert_eq!(routes, 1);
    assert_eq!(positions, STEPS);
    assert_eq!(
        statuses,
        vec![
            ShipmentStatus::Picked,
            ShipmentStatus::InTransit,
            ShipmentStatus::OutForDelivery,
            ShipmentStatus::Signed,
        ]
    );

    let shipment = h.store_shipment("D1").await;
    assert_eq!(shipment.status, ShipmentStatus::Signed);
    assert!(shipment.timeline.picked_at.is_some());
    assert!(shipment.timeline.signed_at.is_some());
    assert!(shipment.timeline.arrived_at_hub_at.is_none());
    assert_eq!(h.tracking("D1").await.position, tianjin());
}

#[tokio::test(start_paused = true)]
async fn destination_outside_every_area_is_rejected() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 10 })).await;
    h.add_shipment("FAR", GeoPoint::new(22.3, 114.2), "Hong Kong").await;

    let err = h.state.orchestrator.ship("FAR").await.unwrap_err();
    assert!(matches!(err, ServiceError::AreaViolation(_)));
    assert_eq!(h.status("FAR").await, ShipmentStatus::Pending);
    assert!(!h.state.scheduler().is_active("FAR"));
}

#[tokio::test(start_paused = true)]
async fn only_pending_shipments_ship() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 10 })).await;
    h.add_shipment("D2", tianjin(), "Tianjin").await;

    h.state.orchestrator.ship("D2").await.unwrap();
    h.state.scheduler().drain().await;
    assert_eq!(h.status("D2").await, ShipmentStatus::Picked);

    let err = h.state.orchestrator.ship("D2").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(_)));
}

#[tokio::test(start_paused = true)]
async fn unknown_order_is_not_found() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 10 })).await;
    let err = h.state.orchestrator.ship("NOPE").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn routing_outage_falls_back_to_a_straight_line() {
    let h = Harness::new(Arc::new(DownRouteProvider)).await;
    h.add_shipment("D3", tianjin(), "Tianjin").await;

    let plan = h.state.orchestrator.ship("D3").await.unwrap();
    assert_eq!(plan.steps, STEPS);

    let route = h.tracking("D3").await.route().unwrap();
    assert_eq!(route.len(), STEPS);
    assert_eq!(route.first(), Some(&common::origin()));
    assert_eq!(route.last(), Some(&tianjin()));
}

#[tokio::test(start_paused = true)]
async fn hub_city_shipment_is_assigned_its_hub() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 10 })).await;
    h.add_shipment("B1", GeoPoint::new(39.95, 116.45), "Chaoyang, Beijing")
        .await;

    let plan = h.state.orchestrator.ship("B1").await.unwrap();
    assert_eq!(plan.hub_id.as_deref(), Some(common::HUB_ID));

    let shipment = h.store_shipment("B1").await;
    assert_eq!(shipment.hub_id.as_deref(), Some(common::HUB_ID));
    assert_eq!(shipment.promised_duration.as_deref(), Some("next-day"));
    // The first leg ends at the hub, not the recipient.
    let route = h.tracking("B1").await.route().unwrap();
    assert_eq!(route.last(), Some(&common::hub_location()));
}

/// Route service that takes a while to answer.
struct SlowRouteProvider;

#[async_trait]
impl RouteProvider for SlowRouteProvider {
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(vec![*origin, *destination])
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_ship_requests_depart_once() {
    let h = Harness::new(Arc::new(SlowRouteProvider)).await;
    h.add_shipment("D4", tianjin(), "Tianjin").await;
    let mut events = h.state.events.subscribe("D4");

    let orchestrator = &h.state.orchestrator;
    let (first, second) = tokio::join!(orchestrator.ship("D4"), orchestrator.ship("D4"));
    assert!(first.is_ok());
    assert!(matches!(second, Err(ServiceError::Conflict(_))));

    let err = orchestrator.ship("D4").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatus(_)));

    let mut routes = 0;
    while let Ok(event) = events.try_recv() {
        if let TrackingEvent::Route(_) = event {
            routes += 1;
        }
    }
    assert_eq!(routes, 1);
}
