use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::observer::LegObserver;
use super::pace::steps_for_pace;
use super::{SimulationError, SimulationSettings};
use crate::clock::Clock;
use crate::events::{NotificationSink, PositionUpdate, TrackingEvent};
use crate::geo::GeoPoint;
use crate::models::ShipmentStatus;
use crate::routing::sampler::fit;

const IN_TRANSIT_AT: f64 = 0.1;
const OUT_FOR_DELIVERY_AT: f64 = 0.9;

/// Everything needed to put one leg on the scheduler.
pub struct LegStart {
    pub order_id: String,
    /// Raw route; fitted to the pace-derived step count before use.
    pub route: Vec<GeoPoint>,
    pub pace: String,
    /// When the leg originally started, for legs picked back up after a
    /// restart. `None` starts at the first point.
    pub resume_from: Option<DateTime<Utc>>,
    pub observer: Arc<dyn LegObserver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// Registered and advancing from `cursor` over `steps` points.
    Scheduled { cursor: usize, steps: usize },
    /// Enough time had already passed; completion ran without scheduling.
    Completed,
}

struct Milestone {
    status: ShipmentStatus,
    index: usize,
    fired: bool,
}

struct LegState {
    route: Vec<GeoPoint>,
    cursor: usize,
    milestones: [Milestone; 2],
    observer: Arc<dyn LegObserver>,
    lane: Lane,
}

impl LegState {
    fn new(route: Vec<GeoPoint>, cursor: usize, observer: Arc<dyn LegObserver>, lane: Lane) -> Self {
        let len = route.len() as f64;
        let milestone = |status, fraction: f64| {
            let index = (len * fraction).floor() as usize;
            Milestone {
                status,
                index,
                // Resumed past the threshold: that status was already reached.
                fired: cursor > index,
            }
        };

        Self {
            milestones: [
                milestone(ShipmentStatus::InTransit, IN_TRANSIT_AT),
                milestone(ShipmentStatus::OutForDelivery, OUT_FOR_DELIVERY_AT),
            ],
            route,
            cursor,
            observer,
            lane,
        }
    }

    /// Milestones reached at the current cursor that have not fired yet.
    fn take_milestones(&mut self) -> Vec<ShipmentStatus> {
        let cursor = self.cursor;
        self.milestones
            .iter_mut()
            .filter(|m| !m.fired && cursor >= m.index)
            .map(|m| {
                m.fired = true;
                m.status
            })
            .collect()
    }
}

type LaneJob = BoxFuture<'static, ()>;

/// Ordered, per-order queue of callback work.
///
/// Ticks hand work to lanes without waiting, so a slow store never stalls
/// the loop, while one order's events still run strictly in order.
struct Lane {
    tx: mpsc::UnboundedSender<LaneJob>,
}

#[derive(Default)]
struct LaneTracker {
    pending: AtomicUsize,
    idle: Notify,
}

impl LaneTracker {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Drives every active leg from one shared tick.
pub struct SimulationScheduler {
    settings: SimulationSettings,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    legs: Mutex<HashMap<String, LegState>>,
    lanes: Arc<LaneTracker>,
}

impl SimulationScheduler {
    pub fn new(
        settings: SimulationSettings,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            sink,
            clock,
            legs: Mutex::new(HashMap::new()),
            lanes: Arc::new(LaneTracker::default()),
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Starts a leg for an order that has none.
    ///
    /// Fails with [`SimulationError::LegAlreadyActive`] if the order is still
    /// moving; use [`replace_leg`](Self::replace_leg) to supersede it.
    pub async fn start_leg(&self, start: LegStart) -> Result<LegOutcome, SimulationError> {
        self.begin(start, false).await
    }

    /// Starts a leg, retiring any leg the order already has.
    pub async fn replace_leg(&self, start: LegStart) -> Result<LegOutcome, SimulationError> {
        self.begin(start, true).await
    }

    async fn begin(&self, start: LegStart, replace: bool) -> Result<LegOutcome, SimulationError> {
        let LegStart {
            order_id,
            route,
            pace,
            resume_from,
            observer,
        } = start;

        if route.is_empty() {
            return Err(SimulationError::EmptyRoute(order_id));
        }

        let steps = steps_for_pace(&pace, self.settings.min_leg_steps);
        let route = fit(&route, steps);
        let cursor = resume_from
            .map(|started| self.resume_cursor(started, route.len()))
            .unwrap_or(0);

        if cursor >= route.len() {
            {
                let mut legs = self.lock_legs();
                if legs.contains_key(&order_id) {
                    if !replace {
                        return Err(SimulationError::LegAlreadyActive(order_id));
                    }
                    legs.remove(&order_id);
                }
            }
            info!(order_id = %order_id, "leg already elapsed, completing immediately");
            finish_leg(order_id, observer, self.clock.now()).await;
            return Ok(LegOutcome::Completed);
        }

        let now = self.clock.now();
        let mut legs = self.lock_legs();
        let lane = match legs.remove(&order_id) {
            Some(previous) if replace => {
                debug!(order_id = %order_id, "replacing active leg");
                previous.lane
            }
            Some(previous) => {
                legs.insert(order_id.clone(), previous);
                return Err(SimulationError::LegAlreadyActive(order_id));
            }
            None => self.spawn_lane(&order_id),
        };

        if cursor == 0 {
            let job = status_job(order_id.clone(), observer.clone(), ShipmentStatus::Picked, now);
            self.enqueue(&order_id, &lane, job);
        }

        let steps = route.len();
        legs.insert(
            order_id.clone(),
            LegState::new(route, cursor, observer, lane),
        );
        debug!(order_id = %order_id, cursor, steps, "leg scheduled");

        Ok(LegOutcome::Scheduled { cursor, steps })
    }

    /// `floor(elapsed / tick)`, clamped to `[0, len]`.
    fn resume_cursor(&self, started: DateTime<Utc>, len: usize) -> usize {
        let elapsed_ms = (self.clock.now() - started).num_milliseconds().max(0) as u128;
        let tick_ms = self.settings.tick_interval.as_millis().max(1);
        usize::try_from(elapsed_ms / tick_ms)
            .unwrap_or(usize::MAX)
            .min(len)
    }

    /// Advances every active leg by one point. Returns how many legs moved.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let mut batch = Vec::new();
        let mut finished = Vec::new();

        {
            let mut legs = self.lock_legs();

            let done: Vec<String> = legs
                .iter()
                .filter(|(_, leg)| leg.cursor >= leg.route.len())
                .map(|(order_id, _)| order_id.clone())
                .collect();
            for order_id in done {
                if let Some(leg) = legs.remove(&order_id) {
                    finished.push((order_id, leg));
                }
            }

            for (order_id, leg) in legs.iter_mut() {
                let update = PositionUpdate::new(order_id.clone(), leg.route[leg.cursor], now);
                let milestones = leg.take_milestones();
                let job = position_job(
                    self.sink.clone(),
                    leg.observer.clone(),
                    update.clone(),
                    milestones,
                );
                self.enqueue(order_id, &leg.lane, job);
                batch.push(update);
                leg.cursor += 1;
            }
        }

        let advanced = batch.len();
        if !batch.is_empty() {
            self.sink
                .publish_global(TrackingEvent::PositionBatch(batch));
        }

        for (order_id, leg) in finished {
            debug!(order_id = %order_id, "leg finished");
            let job = Box::pin(finish_leg(order_id.clone(), leg.observer.clone(), now));
            self.enqueue(&order_id, &leg.lane, job);
        }

        advanced
    }

    /// Ticks every `tick_interval` until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;
        tokio::pin!(shutdown);

        info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            "simulation scheduler started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
        info!(active_legs = self.active_legs(), "simulation scheduler stopped");
    }

    /// Waits until every queued callback has run.
    pub async fn drain(&self) {
        loop {
            let idle = self.lanes.idle.notified();
            if self.lanes.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    pub fn active_legs(&self) -> usize {
        self.lock_legs().len()
    }

    pub fn is_active(&self, order_id: &str) -> bool {
        self.lock_legs().contains_key(order_id)
    }

    /// Index of the next point the order's leg will emit.
    pub fn cursor(&self, order_id: &str) -> Option<usize> {
        self.lock_legs().get(order_id).map(|leg| leg.cursor)
    }

    fn lock_legs(&self) -> MutexGuard<'_, HashMap<String, LegState>> {
        match self.legs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn spawn_lane(&self, order_id: &str) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel::<LaneJob>();
        let tracker = self.lanes.clone();
        let order_id = order_id.to_string();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                tracker.finish();
            }
            debug!(order_id = %order_id, "lane closed");
        });

        Lane { tx }
    }

    fn enqueue(&self, order_id: &str, lane: &Lane, job: LaneJob) {
        self.lanes.pending.fetch_add(1, Ordering::SeqCst);
        if lane.tx.send(job).is_err() {
            self.lanes.finish();
            warn!(order_id, "lane closed, dropping leg event");
        }
    }
}

fn position_job(
    sink: Arc<dyn NotificationSink>,
    observer: Arc<dyn LegObserver>,
    update: PositionUpdate,
    milestones: Vec<ShipmentStatus>,
) -> LaneJob {
    Box::pin(async move {
        let order_id = update.order_id.clone();
        let at = update.ts;

        if let Err(err) = observer.on_position(&order_id, update.point(), at).await {
            warn!(order_id = %order_id, error = %err, "position callback failed");
        }
        sink.publish_order(&order_id, TrackingEvent::Position(update));

        for status in milestones {
            if let Err(err) = observer.on_status(&order_id, status, at).await {
                warn!(order_id = %order_id, %status, error = %err, "status callback failed");
            }
        }
    })
}

fn status_job(
    order_id: String,
    observer: Arc<dyn LegObserver>,
    status: ShipmentStatus,
    at: DateTime<Utc>,
) -> LaneJob {
    Box::pin(async move {
        if let Err(err) = observer.on_status(&order_id, status, at).await {
            warn!(order_id = %order_id, %status, error = %err, "status callback failed");
        }
    })
}

async fn finish_leg(order_id: String, observer: Arc<dyn LegObserver>, at: DateTime<Utc>) {
    if let Some(status) = observer.terminal_status() {
        if let Err(err) = observer.on_status(&order_id, status, at).await {
            warn!(order_id = %order_id, %status, error = %err, "terminal status callback failed");
        }
    }
    if let Err(err) = observer.on_complete(&order_id).await {
        warn!(order_id = %order_id, error = %err, "completion callback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::ServiceError;
    use crate::events::EventHub;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Position(f64),
        Status(ShipmentStatus),
        Complete,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
        fail_positions: bool,
        terminal: Option<ShipmentStatus>,
    }

    impl Recorder {
        fn direct() -> Arc<Self> {
            Arc::new(Self {
                terminal: Some(ShipmentStatus::Signed),
                ..Default::default()
            })
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }

        fn count(&self, wanted: &Seen) -> usize {
            self.seen().iter().filter(|s| *s == wanted).count()
        }
    }

    #[async_trait]
    impl LegObserver for Recorder {
        async fn on_position(
            &self,
            _order_id: &str,
            position: GeoPoint,
            _at: DateTime<Utc>,
        ) -> Result<(), ServiceError> {
            if self.fail_positions {
                return Err(ServiceError::DatabaseError("disk full".into()));
            }
            self.seen.lock().unwrap().push(Seen::Position(position.lat));
            Ok(())
        }

        async fn on_status(
            &self,
            _order_id: &str,
            status: ShipmentStatus,
            _at: DateTime<Utc>,
        ) -> Result<(), ServiceError> {
            self.seen.lock().unwrap().push(Seen::Status(status));
            Ok(())
        }

        async fn on_complete(&self, _order_id: &str) -> Result<(), ServiceError> {
            self.seen.lock().unwrap().push(Seen::Complete);
            Ok(())
        }

        fn terminal_status(&self) -> Option<ShipmentStatus> {
            self.terminal
        }
    }

    fn route(n: usize) -> Vec<GeoPoint> {
        (0..n).map(|i| GeoPoint::new(i as f64, 0.0)).collect()
    }

    fn scheduler(clock: Arc<ManualClock>) -> (SimulationScheduler, Arc<EventHub>) {
        let hub = Arc::new(EventHub::new(256));
        let settings = SimulationSettings {
            tick_interval: Duration::from_secs(5),
            min_leg_steps: 10,
        };
        (SimulationScheduler::new(settings, hub.clone(), clock), hub)
    }

    fn leg(order_id: &str, n: usize, observer: Arc<dyn LegObserver>) -> LegStart {
        LegStart {
            order_id: order_id.into(),
            route: route(n),
            // next-day = 12 steps
            pace: "next-day".into(),
            resume_from: None,
            observer,
        }
    }

    #[tokio::test]
    async fn milestones_fire_once_at_floored_thresholds() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let observer = Recorder::direct();
        let outcome = scheduler.start_leg(leg("O1", 12, observer.clone())).await.unwrap();
        assert_eq!(outcome, LegOutcome::Scheduled { cursor: 0, steps: 12 });

        for _ in 0..13 {
            scheduler.tick();
        }
        scheduler.drain().await;

        let seen = observer.seen();
        assert_eq!(observer.count(&Seen::Status(ShipmentStatus::InTransit)), 1);
        assert_eq!(observer.count(&Seen::Status(ShipmentStatus::OutForDelivery)), 1);
        assert_eq!(observer.count(&Seen::Complete), 1);

        // floor(12 * 0.1) = 1 and floor(12 * 0.9) = 10
        let after = |status| {
            let i = seen
                .iter()
                .position(|s| *s == Seen::Status(status))
                .unwrap();
            seen[i - 1].clone()
        };
        assert_eq!(after(ShipmentStatus::InTransit), Seen::Position(1.0));
        assert_eq!(after(ShipmentStatus::OutForDelivery), Seen::Position(10.0));

        assert_eq!(seen.first(), Some(&Seen::Status(ShipmentStatus::Picked)));
        assert_eq!(
            &seen[seen.len() - 2..],
            &[Seen::Status(ShipmentStatus::Signed), Seen::Complete]
        );
        assert!(!scheduler.is_active("O1"));
    }

    #[tokio::test]
    async fn cursor_advances_by_one_per_tick() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        scheduler
            .start_leg(leg("O1", 12, Recorder::direct()))
            .await
            .unwrap();

        for expected in 1..=12 {
            scheduler.tick();
            assert_eq!(scheduler.cursor("O1"), Some(expected));
        }
        scheduler.tick();
        assert_eq!(scheduler.cursor("O1"), None);
    }

    #[tokio::test]
    async fn resumed_leg_starts_from_elapsed_ticks() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let (scheduler, _) = scheduler(clock.clone());
        clock.advance(ChronoDuration::milliseconds(5 * 5_000 + 2_500));

        let observer = Recorder::direct();
        let mut start_leg = leg("O1", 12, observer.clone());
        start_leg.resume_from = Some(start);
        let outcome = scheduler.start_leg(start_leg).await.unwrap();
        assert_eq!(outcome, LegOutcome::Scheduled { cursor: 5, steps: 12 });

        for _ in 0..8 {
            scheduler.tick();
        }
        scheduler.drain().await;

        // Already past in_transit and no fresh pickup.
        assert_eq!(observer.count(&Seen::Status(ShipmentStatus::Picked)), 0);
        assert_eq!(observer.count(&Seen::Status(ShipmentStatus::InTransit)), 0);
        assert_eq!(observer.count(&Seen::Status(ShipmentStatus::OutForDelivery)), 1);
        assert_eq!(observer.seen().first(), Some(&Seen::Position(5.0)));
        assert_eq!(observer.count(&Seen::Complete), 1);
    }

    #[tokio::test]
    async fn fully_elapsed_leg_completes_without_ticking() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let (scheduler, _) = scheduler(clock.clone());
        clock.advance(ChronoDuration::hours(6));

        let observer = Recorder::direct();
        let mut start_leg = leg("O1", 12, observer.clone());
        start_leg.resume_from = Some(start);

        assert_eq!(scheduler.start_leg(start_leg).await.unwrap(), LegOutcome::Completed);
        assert_eq!(
            observer.seen(),
            vec![Seen::Status(ShipmentStatus::Signed), Seen::Complete]
        );
        assert_eq!(scheduler.active_legs(), 0);
    }

    #[tokio::test]
    async fn start_leg_refuses_to_overwrite_but_replace_leg_does() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        scheduler
            .start_leg(leg("O1", 12, Recorder::direct()))
            .await
            .unwrap();
        scheduler.tick();
        scheduler.tick();

        let err = scheduler
            .start_leg(leg("O1", 12, Recorder::direct()))
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::LegAlreadyActive(id) if id == "O1"));
        assert_eq!(scheduler.cursor("O1"), Some(2));

        scheduler
            .replace_leg(leg("O1", 12, Recorder::direct()))
            .await
            .unwrap();
        assert_eq!(scheduler.cursor("O1"), Some(0));
        assert_eq!(scheduler.active_legs(), 1);
    }

    #[tokio::test]
    async fn empty_route_is_rejected() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let err = scheduler
            .start_leg(leg("O1", 0, Recorder::direct()))
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::EmptyRoute(_)));
        assert_eq!(scheduler.active_legs(), 0);
    }

    #[tokio::test]
    async fn failing_observer_does_not_stall_other_legs() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let broken = Arc::new(Recorder {
            fail_positions: true,
            terminal: Some(ShipmentStatus::Signed),
            ..Default::default()
        });
        let healthy = Recorder::direct();
        scheduler.start_leg(leg("A", 12, broken)).await.unwrap();
        scheduler.start_leg(leg("B", 12, healthy.clone())).await.unwrap();

        for _ in 0..3 {
            scheduler.tick();
        }
        scheduler.drain().await;

        assert_eq!(scheduler.cursor("A"), Some(3));
        assert_eq!(
            healthy
                .seen()
                .iter()
                .filter(|s| matches!(s, Seen::Position(_)))
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn short_routes_are_stretched_to_the_step_count() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let outcome = scheduler
            .start_leg(leg("O1", 2, Recorder::direct()))
            .await
            .unwrap();
        assert_eq!(outcome, LegOutcome::Scheduled { cursor: 0, steps: 12 });
    }

    #[tokio::test]
    async fn each_tick_publishes_one_global_batch() {
        let (scheduler, hub) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let mut global = hub.subscribe_global();
        let mut single = hub.subscribe("A");
        scheduler.start_leg(leg("A", 12, Recorder::direct())).await.unwrap();
        scheduler.start_leg(leg("B", 12, Recorder::direct())).await.unwrap();

        assert_eq!(scheduler.tick(), 2);
        scheduler.drain().await;

        match global.recv().await.unwrap() {
            TrackingEvent::PositionBatch(batch) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected event {other:?}"),
        }
        match single.recv().await.unwrap() {
            TrackingEvent::Position(update) => {
                assert_eq!(update.order_id, "A");
                assert_eq!(update.lat, 0.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_shutdown() {
        let (scheduler, _) = scheduler(Arc::new(ManualClock::new(Utc::now())));
        let scheduler = Arc::new(scheduler);
        scheduler
            .start_leg(leg("O1", 12, Recorder::direct()))
            .await
            .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(5_000 * 3 + 100)).await;
        assert_eq!(scheduler.cursor("O1"), Some(3));

        stop_tx.send(()).unwrap();
        runner.await.unwrap();
    }
}
