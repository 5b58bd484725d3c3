//! Rebuilds in-memory simulation state from the store after a restart.

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{group_by_hub, hub_for, DispatchOrchestrator};
use crate::errors::ServiceError;
use crate::models::{Shipment, ShipmentStatus, TransitHub};
use crate::simulation::{LegOutcome, LegStart};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    /// Legs put back on the scheduler.
    pub resumed: usize,
    /// Legs whose time had already run out and completed on the spot.
    pub completed: usize,
    /// Shipments left alone because their tracking data was missing or bad.
    pub skipped: usize,
    /// Hub batches dispatched from shipments waiting at a hub.
    pub batches: usize,
}

/// Resumes every in-flight leg, then dispatches any hub that has enough
/// shipments waiting. One bad shipment never stops the rest.
#[instrument(skip(orchestrator))]
pub async fn resume(orchestrator: &DispatchOrchestrator) -> Result<ResumeReport, ServiceError> {
    let store = orchestrator.store();
    let mut report = ResumeReport::default();

    let hubs = store.list_hubs().await?;
    let in_flight = store
        .find_shipments_by_status(&ShipmentStatus::in_flight())
        .await?;

    for shipment in &in_flight {
        match resume_leg(orchestrator, shipment, &hubs).await {
            Ok(Some(LegOutcome::Scheduled { .. })) => report.resumed += 1,
            Ok(Some(LegOutcome::Completed)) => report.completed += 1,
            Ok(None) => report.skipped += 1,
            Err(err) => {
                warn!(order_id = %shipment.order_id, error = %err, "failed to resume leg");
                report.skipped += 1;
            }
        }
    }

    let waiting = store
        .find_shipments_by_status(&[ShipmentStatus::ArrivedAtHub])
        .await?;
    for (hub_id, (hub, order_ids)) in group_by_hub(&waiting, &hubs) {
        if order_ids.len() < orchestrator.settings().batch_threshold {
            continue;
        }
        match orchestrator.dispatch_batch(hub, order_ids).await {
            Ok(_) => report.batches += 1,
            Err(err) => warn!(hub_id = %hub_id, error = %err, "failed to dispatch waiting batch"),
        }
    }

    info!(
        resumed = report.resumed,
        completed = report.completed,
        skipped = report.skipped,
        batches = report.batches,
        "resume finished"
    );
    Ok(report)
}

async fn resume_leg(
    orchestrator: &DispatchOrchestrator,
    shipment: &Shipment,
    hubs: &[TransitHub],
) -> Result<Option<LegOutcome>, ServiceError> {
    let order_id = &shipment.order_id;
    let Some(record) = orchestrator.store().get_tracking(order_id).await? else {
        warn!(order_id = %order_id, "no tracking record to resume from");
        return Ok(None);
    };

    let route = match record.active_leg() {
        Ok(route) if !route.is_empty() => route,
        Ok(_) => {
            warn!(order_id = %order_id, "stored route has no active leg");
            return Ok(None);
        }
        Err(err) => {
            warn!(order_id = %order_id, error = %err, "stored route is unreadable");
            return Ok(None);
        }
    };

    // Last-mile legs and hub-less shipments end at the recipient. A stop from
    // an interrupted run resumes as its own direct leg: the run itself is not
    // rebuilt, so its remaining stops drive in parallel without mirrored
    // positions or handoff delays.
    let observer = if shipment.status != ShipmentStatus::OutForDelivery
        && hub_for(shipment, hubs).is_some()
    {
        orchestrator.hub_observer()
    } else {
        orchestrator.direct_observer()
    };

    let outcome = orchestrator
        .scheduler()
        .start_leg(LegStart {
            order_id: order_id.clone(),
            route,
            pace: record.pace,
            resume_from: record.leg_started_at,
            observer,
        })
        .await?;
    Ok(Some(outcome))
}
