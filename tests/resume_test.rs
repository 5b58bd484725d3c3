//! Picking simulation state back up from the store after a restart.

mod common;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use common::{hub_location, origin, test_config, Harness, LinearRouteProvider, HUB_ID};
use logistics_tracker::dispatch::resume::resume;
use logistics_tracker::dispatch::RunPhase;
use logistics_tracker::geo::GeoPoint;
use logistics_tracker::models::{ShipmentStatus, TrackingRecord};
use logistics_tracker::routing::sampler::fit;
use logistics_tracker::store::TrackingStore;
use logistics_tracker::AppState;

const STEPS: usize = 12;

async fn in_flight(h: &Harness, order_id: &str, status: ShipmentStatus, address: &str) {
    h.add_shipment(order_id, GeoPoint::new(39.12, 117.20), address)
        .await;
    h.store
        .update_status(order_id, status, h.clock_now())
        .await
        .unwrap();
}

async fn tracked(h: &Harness, order_id: &str, started_secs_ago: i64) {
    let route = fit(&[origin(), GeoPoint::new(39.12, 117.20)], STEPS);
    let mut record =
        TrackingRecord::new(order_id, origin(), h.clock_now(), "next-day", &route).unwrap();
    record.leg_started_at = Some(h.clock_now() - ChronoDuration::seconds(started_secs_ago));
    h.store.upsert_tracking_point(record).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn resumes_legs_from_elapsed_time_and_skips_bad_records() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 10 })).await;

    in_flight(&h, "GOOD", ShipmentStatus::InTransit, "Tianjin").await;
    tracked(&h, "GOOD", 30).await;

    in_flight(&h, "DONE", ShipmentStatus::OutForDelivery, "Tianjin").await;
    tracked(&h, "DONE", 3_600).await;

    in_flight(&h, "BAD", ShipmentStatus::InTransit, "Tianjin").await;
    tracked(&h, "BAD", 10).await;
    let mut corrupt = h.tracking("BAD").await;
    corrupt.route_path = "{not a route".into();
    h.store.upsert_tracking_point(corrupt).await.unwrap();

    in_flight(&h, "MISSING", ShipmentStatus::Picked, "Tianjin").await;

    let report = resume(&h.state.orchestrator).await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.batches, 0);

    // 30 s at a 5 s tick puts the leg six points in.
    assert_eq!(h.state.scheduler().cursor("GOOD"), Some(6));
    assert!(!h.state.scheduler().is_active("BAD"));
    assert!(!h.state.scheduler().is_active("MISSING"));

    // The fully elapsed leg completed on the spot.
    assert!(!h.state.scheduler().is_active("DONE"));
    assert_eq!(h.status("DONE").await, ShipmentStatus::Signed);

    // Resumed legs carry on to delivery without replaying earlier milestones.
    h.ticks(STEPS - 6 + 1).await;
    let good = h.store_shipment("GOOD").await;
    assert_eq!(good.status, ShipmentStatus::Signed);
    assert!(good.timeline.out_for_delivery_at.is_some());
    assert!(good.timeline.picked_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn resume_dispatches_hubs_with_enough_waiting_shipments() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 8 })).await;

    let destinations = [
        ("W1", GeoPoint::new(39.95, 116.40)),
        ("W2", GeoPoint::new(39.92, 116.41)),
        ("W3", GeoPoint::new(40.02, 116.38)),
    ];
    for (id, destination) in destinations {
        h.add_shipment(id, destination, "Xicheng, Beijing").await;
        h.store.assign_plan(id, "next-day", Some(HUB_ID)).await.unwrap();
        h.store
            .update_status(id, ShipmentStatus::ArrivedAtHub, h.clock_now())
            .await
            .unwrap();
        let first_leg = fit(&[origin(), hub_location()], STEPS);
        let record =
            TrackingRecord::new(id, hub_location(), h.clock_now(), "next-day", &first_leg)
                .unwrap();
        h.store.upsert_tracking_point(record).await.unwrap();
    }

    let report = resume(&h.state.orchestrator).await.unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.resumed, 0);

    let batches = h.state.orchestrator.active_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].phase, RunPhase::Loading);
    assert_eq!(batches[0].stops, vec!["W2", "W1", "W3"]);

    let w3 = h.tracking("W3").await;
    assert_eq!(w3.route().unwrap().len(), STEPS + 3 * 8);
    assert_eq!(w3.leg_offset, STEPS + 2 * 8);
}

#[tokio::test(start_paused = true)]
async fn restart_during_loading_replans_from_the_first_leg() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 8 })).await;
    let first_leg = fit(&[origin(), hub_location()], STEPS);
    for (id, destination) in [
        ("W1", GeoPoint::new(39.95, 116.40)),
        ("W2", GeoPoint::new(39.92, 116.41)),
        ("W3", GeoPoint::new(40.02, 116.38)),
    ] {
        h.add_shipment(id, destination, "Xicheng, Beijing").await;
        h.store.assign_plan(id, "next-day", Some(HUB_ID)).await.unwrap();
        h.store
            .update_status(id, ShipmentStatus::ArrivedAtHub, h.clock_now())
            .await
            .unwrap();
        let record =
            TrackingRecord::new(id, hub_location(), h.clock_now(), "next-day", &first_leg)
                .unwrap();
        h.store.upsert_tracking_point(record).await.unwrap();
    }

    assert_eq!(resume(&h.state.orchestrator).await.unwrap().batches, 1);
    let planned = h.tracking("W3").await.route().unwrap();
    assert_eq!(planned.len(), STEPS + 3 * 8);

    // The process dies before the truck leaves; a new one finds the same
    // shipments still waiting at the hub.
    let restarted = AppState::from_parts(
        test_config(),
        h.store.clone(),
        Arc::new(LinearRouteProvider { points: 8 }),
        h.clock.clone(),
    );
    assert_eq!(resume(&restarted.orchestrator).await.unwrap().batches, 1);

    for (position, id) in ["W2", "W1", "W3"].iter().enumerate() {
        let record = h.tracking(id).await;
        let route = record.route().unwrap();
        assert_eq!(route.len(), STEPS + 8 * (position + 1));
        assert_eq!(&route[..STEPS], first_leg.as_slice());
        assert_eq!(record.first_leg_len, STEPS);
        assert_eq!(record.leg_offset, STEPS + 8 * position);
    }
    assert_eq!(h.tracking("W3").await.route().unwrap(), planned);
}

#[tokio::test(start_paused = true)]
async fn waiting_chain_stop_restarts_from_the_beginning_of_its_leg() {
    let h = Harness::new(Arc::new(LinearRouteProvider { points: 8 })).await;
    in_flight(&h, "WAIT", ShipmentStatus::OutForDelivery, "Xicheng, Beijing").await;

    let journey = fit(&[origin(), hub_location(), GeoPoint::new(39.12, 117.20)], 30);
    let mut record =
        TrackingRecord::new("WAIT", hub_location(), h.clock_now(), "next-day", &journey).unwrap();
    record.leg_offset = 18;
    record.leg_started_at = None;
    h.store.upsert_tracking_point(record).await.unwrap();

    let report = resume(&h.state.orchestrator).await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(h.state.scheduler().cursor("WAIT"), Some(0));

    // Only the last-mile part of the route is driven.
    h.ticks(1).await;
    assert_eq!(h.tracking("WAIT").await.position, journey[18]);
}
