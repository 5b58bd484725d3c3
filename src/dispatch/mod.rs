//! Ship-time routing, hub batching and chained last-mile delivery.
//!
//! A shipment either drives straight to its recipient or, when its address
//! names a hub city, to that hub first. Hub arrivals accumulate until a batch
//! is large enough; the batch is then ordered greedily, routed stop to stop,
//! and delivered one stop at a time by a single simulated truck.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{NotificationSink, RouteUpdate, TrackingEvent};
use crate::geo::GeoPoint;
use crate::models::delivery_rule::match_rule;
use crate::models::hub::match_hub;
use crate::models::tracking::encode_route;
use crate::models::{Shipment, ShipmentStatus, TrackingRecord, TransitHub};
use crate::routing::sampler::{fit, interpolate, straight_line};
use crate::routing::{try_route, RouteProvider};
use crate::simulation::pace::steps_for_pace;
use crate::simulation::{LegObserver, LegStart, SimulationScheduler};
use crate::store::TrackingStore;

pub mod observers;
pub mod resume;
pub mod sequencing;
pub mod status;

use observers::{ChainLegObserver, DirectLegObserver, HubLegObserver};
use sequencing::greedy_order;
pub use status::StatusRecorder;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Unloading and sorting time between reaching a hub and being counted
    /// as arrived.
    pub hub_settle_delay: Duration,
    /// Loading time between planning a batch and the truck leaving.
    pub dispatch_settle_delay: Duration,
    /// Parking and handover time at each stop.
    pub handoff_delay: Duration,
    /// Arrived shipments a hub needs before it dispatches.
    pub batch_threshold: usize,
    /// Points per segment for the straight-line fallback of a first leg.
    pub fallback_interpolation_steps: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            hub_settle_delay: Duration::from_secs(10),
            dispatch_settle_delay: Duration::from_secs(5),
            handoff_delay: Duration::from_secs(2),
            batch_threshold: 3,
            fallback_interpolation_steps: 10,
        }
    }
}

impl From<&AppConfig> for DispatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            hub_settle_delay: Duration::from_millis(config.hub_settle_delay_ms),
            dispatch_settle_delay: Duration::from_millis(config.dispatch_settle_delay_ms),
            handoff_delay: Duration::from_millis(config.handoff_delay_ms),
            batch_threshold: config.hub_batch_threshold,
            fallback_interpolation_steps: config.fallback_interpolation_steps,
        }
    }
}

/// What [`DispatchOrchestrator::ship`] decided for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipPlan {
    pub order_id: String,
    pub promised_duration: String,
    pub hub_id: Option<String>,
    pub steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Routes are planned; the truck is still loading.
    Loading,
    /// Stops are being delivered in sequence.
    Delivering,
}

struct DispatchRun {
    hub_id: String,
    stops: Vec<String>,
    segments: Vec<Vec<GeoPoint>>,
    paces: Vec<String>,
    /// Stop currently being driven to.
    index: usize,
    phase: RunPhase,
}

/// Read-only view of a dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub hub_id: String,
    pub stops: Vec<String>,
    pub index: usize,
    pub phase: RunPhase,
}

impl BatchProgress {
    pub fn current_stop(&self) -> Option<&str> {
        self.stops.get(self.index).map(String::as_str)
    }
}

/// Hub a shipment is routed through: the one assigned at ship time, or a
/// keyword match for shipments that predate the assignment.
pub fn hub_for<'a>(shipment: &Shipment, hubs: &'a [TransitHub]) -> Option<&'a TransitHub> {
    match &shipment.hub_id {
        Some(hub_id) => hubs.iter().find(|hub| &hub.id == hub_id),
        None => match_hub(hubs, &shipment.destination_address),
    }
}

/// Groups shipments by the hub they route through, ordered by hub id.
pub fn group_by_hub<'a>(
    shipments: &[Shipment],
    hubs: &'a [TransitHub],
) -> BTreeMap<String, (&'a TransitHub, Vec<String>)> {
    let mut groups: BTreeMap<String, (&TransitHub, Vec<String>)> = BTreeMap::new();
    for shipment in shipments {
        match hub_for(shipment, hubs) {
            Some(hub) => groups
                .entry(hub.id.clone())
                .or_insert_with(|| (hub, Vec::new()))
                .1
                .push(shipment.order_id.clone()),
            None => warn!(order_id = %shipment.order_id, "no hub matches shipment"),
        }
    }
    groups
}

/// Claims the orders in `order_ids` nobody holds yet, but only when at least
/// `at_least` of them are free. Claims nothing otherwise.
fn claim_unclaimed(
    claimed: &mut HashSet<String>,
    order_ids: Vec<String>,
    at_least: usize,
) -> Option<Vec<String>> {
    let free: Vec<String> = order_ids
        .into_iter()
        .filter(|id| !claimed.contains(id))
        .collect();
    if free.is_empty() || free.len() < at_least {
        return None;
    }
    claimed.extend(free.iter().cloned());
    Some(free)
}

pub struct DispatchOrchestrator {
    me: Weak<DispatchOrchestrator>,
    settings: DispatchSettings,
    store: Arc<dyn TrackingStore>,
    routes: Arc<dyn RouteProvider>,
    scheduler: Arc<SimulationScheduler>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    statuses: StatusRecorder,
    /// Orders already taken by a batch that has not left yet.
    claimed: Mutex<HashSet<String>>,
    runs: Mutex<HashMap<Uuid, DispatchRun>>,
}

impl DispatchOrchestrator {
    pub fn new(
        settings: DispatchSettings,
        store: Arc<dyn TrackingStore>,
        routes: Arc<dyn RouteProvider>,
        scheduler: Arc<SimulationScheduler>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let statuses = StatusRecorder::new(store.clone(), sink.clone());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            settings,
            store,
            routes,
            scheduler,
            sink,
            clock,
            statuses,
            claimed: Mutex::new(HashSet::new()),
            runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn TrackingStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<SimulationScheduler> {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn direct_observer(&self) -> Arc<dyn LegObserver> {
        Arc::new(DirectLegObserver::new(
            self.store.clone(),
            self.statuses.clone(),
        ))
    }

    pub(crate) fn hub_observer(&self) -> Arc<dyn LegObserver> {
        Arc::new(HubLegObserver::new(
            self.store.clone(),
            self.statuses.clone(),
            self.me.clone(),
        ))
    }

    /// Moves a pending shipment onto the road.
    ///
    /// Rejects shipments that are not pending or whose destination lies
    /// outside every delivery area. Routing problems never fail the request;
    /// a straight line is driven instead.
    #[instrument(skip(self))]
    pub async fn ship(&self, order_id: &str) -> Result<ShipPlan, ServiceError> {
        let claim = vec![order_id.to_string()];
        if self.claim(claim.clone(), 1).is_none() {
            return Err(ServiceError::Conflict(format!(
                "Shipment {} is already being shipped",
                order_id
            )));
        }
        let result = self.ship_claimed(order_id).await;
        self.release(&claim);
        result
    }

    async fn ship_claimed(&self, order_id: &str) -> Result<ShipPlan, ServiceError> {
        let shipment = self
            .store
            .get_shipment(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Shipment {}", order_id)))?;
        // A leg that just started may not have recorded `picked` yet.
        if shipment.status != ShipmentStatus::Pending || self.scheduler.is_active(order_id) {
            return Err(ServiceError::InvalidStatus(format!(
                "Shipment {} is {}, only pending shipments can ship",
                order_id, shipment.status
            )));
        }

        let rules = self.store.list_delivery_rules().await?;
        let rule = match_rule(&rules, &shipment.destination).ok_or_else(|| {
            ServiceError::AreaViolation(format!(
                "destination {} of shipment {} is outside every delivery area",
                shipment.destination, order_id
            ))
        })?;
        let pace = rule.promised_duration.clone();

        let hub = self
            .store
            .find_hub_by_address_keyword(&shipment.destination_address)
            .await?;
        let hub_id = hub.as_ref().map(|h| h.id.clone());
        self.store
            .assign_plan(order_id, &pace, hub_id.as_deref())
            .await?;

        let target = hub.as_ref().map(|h| h.location).unwrap_or(shipment.destination);
        let raw = match try_route(self.routes.as_ref(), &shipment.origin, &target).await {
            Some(path) => path,
            None => interpolate(
                &straight_line(shipment.origin, target),
                self.settings.fallback_interpolation_steps,
            ),
        };
        let steps = steps_for_pace(&pace, self.scheduler.settings().min_leg_steps);
        let route = fit(&raw, steps);

        let record = TrackingRecord::new(order_id, shipment.origin, self.clock.now(), &pace, &route)?;
        self.store.upsert_tracking_point(record).await?;
        self.sink.publish_order(
            order_id,
            TrackingEvent::Route(RouteUpdate {
                order_id: order_id.to_string(),
                route_path: route.clone(),
            }),
        );

        let observer = if hub.is_some() {
            self.hub_observer()
        } else {
            self.direct_observer()
        };
        let steps = route.len();
        self.scheduler
            .start_leg(LegStart {
                order_id: order_id.to_string(),
                route,
                pace: pace.clone(),
                resume_from: None,
                observer,
            })
            .await?;

        info!(order_id, hub_id = ?hub_id, steps, "shipment departed");
        Ok(ShipPlan {
            order_id: order_id.to_string(),
            promised_duration: pace,
            hub_id,
            steps,
        })
    }

    /// Handles a first leg reaching its hub after the settle delay.
    pub fn schedule_hub_arrival(&self, order_id: &str) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let order_id = order_id.to_string();
        let delay = self.settings.hub_settle_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = this.arrive_at_hub(&order_id).await {
                error!(order_id = %order_id, error = %err, "hub arrival handling failed");
            }
        });
    }

    async fn arrive_at_hub(&self, order_id: &str) -> Result<Option<Uuid>, ServiceError> {
        self.statuses
            .record(order_id, ShipmentStatus::ArrivedAtHub, self.clock.now())
            .await?;

        let shipment = self
            .store
            .get_shipment(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Shipment {}", order_id)))?;
        let hubs = self.store.list_hubs().await?;
        match hub_for(&shipment, &hubs) {
            Some(hub) => self.check_hub(hub).await,
            None => {
                warn!(order_id, "arrived shipment matches no hub");
                Ok(None)
            }
        }
    }

    /// Dispatches everything waiting at `hub` once the batch threshold is met.
    pub async fn check_hub(&self, hub: &TransitHub) -> Result<Option<Uuid>, ServiceError> {
        let waiting = self
            .store
            .find_shipments_by_status(&[ShipmentStatus::ArrivedAtHub])
            .await?;
        let hubs = self.store.list_hubs().await?;

        let ready: Vec<String> = waiting
            .iter()
            .filter(|s| hub_for(s, &hubs).is_some_and(|h| h.id == hub.id))
            .map(|s| s.order_id.clone())
            .collect();

        // Counting and claiming happen under one lock so a concurrent check
        // cannot leave this one with a partial batch.
        let Some(ids) = self.claim(ready, self.settings.batch_threshold) else {
            debug!(
                hub_id = %hub.id,
                threshold = self.settings.batch_threshold,
                "hub below batch threshold"
            );
            return Ok(None);
        };

        self.dispatch_claimed(hub, ids).await.map(Some)
    }

    /// Plans a last-mile run from `hub` over `order_ids` and starts it once
    /// the truck is loaded. Returns the run's batch id.
    #[instrument(skip(self, hub), fields(hub_id = %hub.id))]
    pub async fn dispatch_batch(
        &self,
        hub: &TransitHub,
        order_ids: Vec<String>,
    ) -> Result<Uuid, ServiceError> {
        let ids = self.claim(order_ids, 1).ok_or_else(|| {
            ServiceError::Conflict(format!(
                "every requested order at hub {} is already being dispatched",
                hub.id
            ))
        })?;
        self.dispatch_claimed(hub, ids).await
    }

    async fn dispatch_claimed(
        &self,
        hub: &TransitHub,
        ids: Vec<String>,
    ) -> Result<Uuid, ServiceError> {
        match self.plan_batch(hub, &ids).await {
            Ok(batch_id) => Ok(batch_id),
            Err(err) => {
                self.release(&ids);
                Err(err)
            }
        }
    }

    async fn plan_batch(&self, hub: &TransitHub, ids: &[String]) -> Result<Uuid, ServiceError> {
        let mut shipments = Vec::with_capacity(ids.len());
        for order_id in ids {
            match self.store.get_shipment(order_id).await? {
                Some(shipment) => shipments.push(shipment),
                None => warn!(order_id = %order_id, "batched shipment vanished"),
            }
        }
        if shipments.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no shipments left to dispatch from hub {}",
                hub.id
            )));
        }

        let destinations: Vec<GeoPoint> = shipments.iter().map(|s| s.destination).collect();
        let sequence: Vec<Shipment> = greedy_order(&hub.location, &destinations)
            .into_iter()
            .map(|i| shipments[i].clone())
            .collect();

        let mut segments = Vec::with_capacity(sequence.len());
        let mut from = hub.location;
        for shipment in &sequence {
            let segment = try_route(self.routes.as_ref(), &from, &shipment.destination)
                .await
                .unwrap_or_else(|| straight_line(from, shipment.destination));
            segments.push(segment);
            from = shipment.destination;
        }

        let now = self.clock.now();
        let mut last_mile: Vec<GeoPoint> = Vec::new();
        let mut paces = Vec::with_capacity(sequence.len());
        for (shipment, segment) in sequence.iter().zip(&segments) {
            let previous = self.store.get_tracking(&shipment.order_id).await?;
            // Composed from the first leg only, so planning the same stop
            // again (say after a restart during loading) never stacks last miles.
            let (first_leg, pace) = match previous {
                Some(record) => {
                    let first_leg = record.first_leg().unwrap_or_else(|err| {
                        warn!(order_id = %shipment.order_id, error = %err, "stored first leg unreadable");
                        Vec::new()
                    });
                    (first_leg, record.pace)
                }
                None => (
                    Vec::new(),
                    shipment.promised_duration.clone().unwrap_or_default(),
                ),
            };

            let first_leg_len = first_leg.len();
            let leg_offset = first_leg_len + last_mile.len();
            last_mile.extend_from_slice(segment);
            let mut route = first_leg;
            route.extend_from_slice(&last_mile);

            let record = TrackingRecord {
                order_id: shipment.order_id.clone(),
                position: hub.location,
                recorded_at: now,
                pace: pace.clone(),
                route_path: encode_route(&route)?,
                first_leg_len,
                leg_offset,
                leg_started_at: None,
            };
            self.store.upsert_tracking_point(record).await?;
            self.sink.publish_order(
                &shipment.order_id,
                TrackingEvent::Route(RouteUpdate {
                    order_id: shipment.order_id.clone(),
                    route_path: route,
                }),
            );
            paces.push(pace);
        }

        let batch_id = Uuid::new_v4();
        let stops: Vec<String> = sequence.iter().map(|s| s.order_id.clone()).collect();
        info!(%batch_id, hub_id = %hub.id, stops = ?stops, "batch planned");

        self.lock_runs().insert(
            batch_id,
            DispatchRun {
                hub_id: hub.id.clone(),
                stops,
                segments,
                paces,
                index: 0,
                phase: RunPhase::Loading,
            },
        );

        if let Some(this) = self.me.upgrade() {
            let delay = self.settings.dispatch_settle_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.depart(batch_id).await;
            });
        }

        Ok(batch_id)
    }

    async fn depart(&self, batch_id: Uuid) {
        let stops = {
            let mut runs = self.lock_runs();
            match runs.get_mut(&batch_id) {
                Some(run) => {
                    run.phase = RunPhase::Delivering;
                    run.stops.clone()
                }
                None => return,
            }
        };

        let now = self.clock.now();
        for order_id in &stops {
            if let Err(err) = self
                .statuses
                .record(order_id, ShipmentStatus::OutForDelivery, now)
                .await
            {
                warn!(order_id = %order_id, error = %err, "failed to mark out for delivery");
            }
        }
        self.release(&stops);

        self.advance(batch_id).await;
    }

    /// Starts the leg for the run's current stop, skipping stops whose leg
    /// cannot start. Retires the run once every stop is done.
    async fn advance(&self, batch_id: Uuid) {
        loop {
            let (order_id, route, pace, later_stops) = {
                let mut runs = self.lock_runs();
                let Some(run) = runs.get(&batch_id) else {
                    return;
                };
                if run.index >= run.stops.len() {
                    runs.remove(&batch_id);
                    info!(%batch_id, "dispatch run finished");
                    return;
                }
                let i = run.index;
                (
                    run.stops[i].clone(),
                    run.segments[i].clone(),
                    run.paces[i].clone(),
                    run.stops[i + 1..].to_vec(),
                )
            };

            if let Err(err) = self.mark_leg_started(&order_id).await {
                warn!(order_id = %order_id, error = %err, "failed to stamp leg start");
            }

            let observer = Arc::new(ChainLegObserver::new(
                self.store.clone(),
                self.sink.clone(),
                self.me.clone(),
                batch_id,
                later_stops,
            ));
            // The last-mile leg supersedes anything still running for the order.
            match self
                .scheduler
                .replace_leg(LegStart {
                    order_id: order_id.clone(),
                    route,
                    pace,
                    resume_from: None,
                    observer,
                })
                .await
            {
                Ok(_) => {
                    debug!(%batch_id, order_id = %order_id, "stop leg started");
                    return;
                }
                Err(err) => {
                    warn!(%batch_id, order_id = %order_id, error = %err, "skipping undeliverable stop");
                    self.bump(batch_id, &order_id);
                }
            }
        }
    }

    async fn mark_leg_started(&self, order_id: &str) -> Result<(), ServiceError> {
        if let Some(mut record) = self.store.get_tracking(order_id).await? {
            record.leg_started_at = Some(self.clock.now());
            self.store.upsert_tracking_point(record).await?;
        }
        Ok(())
    }

    /// Signs `order_id` off after the handover delay and moves the run on.
    pub fn schedule_handoff(&self, batch_id: Uuid, order_id: &str) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let order_id = order_id.to_string();
        let delay = self.settings.handoff_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = this
                .statuses
                .record(&order_id, ShipmentStatus::Signed, this.clock.now())
                .await
            {
                warn!(order_id = %order_id, error = %err, "failed to sign off stop");
            }
            this.bump(batch_id, &order_id);
            this.advance(batch_id).await;
        });
    }

    fn bump(&self, batch_id: Uuid, order_id: &str) {
        let mut runs = self.lock_runs();
        if let Some(run) = runs.get_mut(&batch_id) {
            if run.stops.get(run.index).map(String::as_str) == Some(order_id) {
                run.index += 1;
            } else {
                warn!(%batch_id, order_id, "stop completed out of turn");
            }
        }
    }

    pub fn batch_progress(&self, batch_id: Uuid) -> Option<BatchProgress> {
        self.lock_runs().get(&batch_id).map(|run| BatchProgress {
            batch_id,
            hub_id: run.hub_id.clone(),
            stops: run.stops.clone(),
            index: run.index,
            phase: run.phase,
        })
    }

    pub fn active_batches(&self) -> Vec<BatchProgress> {
        let ids: Vec<Uuid> = self.lock_runs().keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.batch_progress(id))
            .collect()
    }

    fn claim(&self, order_ids: Vec<String>, at_least: usize) -> Option<Vec<String>> {
        claim_unclaimed(&mut self.lock_claimed(), order_ids, at_least)
    }

    fn release(&self, order_ids: &[String]) {
        let mut claimed = self.lock_claimed();
        for id in order_ids {
            claimed.remove(id);
        }
    }

    fn lock_claimed(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.claimed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_runs(&self) -> MutexGuard<'_, HashMap<Uuid, DispatchRun>> {
        match self.runs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hub(id: &str, keyword: &str) -> TransitHub {
        TransitHub {
            id: id.into(),
            name: id.into(),
            location: GeoPoint::new(0.0, 0.0),
            city_keyword: keyword.into(),
        }
    }

    fn shipment(id: &str, address: &str, hub_id: Option<&str>) -> Shipment {
        let mut s = Shipment::new(
            id,
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 1.0),
            address,
            Utc::now(),
        );
        s.hub_id = hub_id.map(str::to_string);
        s
    }

    #[test]
    fn stored_hub_assignment_wins_over_keyword() {
        let hubs = vec![hub("H1", "Beijing"), hub("H2", "Shanghai")];
        let s = shipment("O1", "Beijing Road, Shanghai", Some("H2"));
        assert_eq!(hub_for(&s, &hubs).map(|h| h.id.as_str()), Some("H2"));

        let legacy = shipment("O2", "Beijing Road, Shanghai", None);
        assert_eq!(hub_for(&legacy, &hubs).map(|h| h.id.as_str()), Some("H1"));
    }

    #[test]
    fn groups_shipments_by_hub() {
        let hubs = vec![hub("H1", "Beijing"), hub("H2", "Shanghai")];
        let shipments = vec![
            shipment("O1", "Chaoyang, Beijing", None),
            shipment("O2", "Pudong, Shanghai", None),
            shipment("O3", "Haidian, Beijing", None),
            shipment("O4", "Nowhere", None),
        ];
        let groups = group_by_hub(&shipments, &hubs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["H1"].1, vec!["O1".to_string(), "O3".to_string()]);
        assert_eq!(groups["H2"].1, vec!["O2".to_string()]);
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn overlapping_claim_below_threshold_takes_nothing() {
        let mut claimed = HashSet::new();
        assert_eq!(
            claim_unclaimed(&mut claimed, ids(&["A", "B", "C"]), 3),
            Some(ids(&["A", "B", "C"]))
        );

        // A slower check saw one more arrival but only D is still free.
        assert_eq!(claim_unclaimed(&mut claimed, ids(&["A", "B", "C", "D"]), 3), None);
        assert!(!claimed.contains("D"));

        assert_eq!(claim_unclaimed(&mut claimed, ids(&["D"]), 1), Some(ids(&["D"])));
        assert_eq!(claim_unclaimed(&mut claimed, ids(&["D"]), 1), None);
    }
}
