use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wake_proto::events::{EngineEvent, EventKind, StateTag};

use crate::alert::{AlertOutput, Notifier, RepeatingAlert, WAKE_UP_BODY, WAKE_UP_TITLE};
use crate::background::BackgroundActivity;
use crate::geo::{distance_m, Coordinate};
use crate::gnss::LocationSample;
use crate::policy::PolicySource;

/// Absorbs float rounding when a fix sits exactly on the radius.
const RADIUS_EPSILON_M: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub locality: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub sub_locality: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub coord: Coordinate,
    pub name: Option<String>,
    pub address: Option<Address>,
}

impl Target {
    pub fn new(coord: Coordinate) -> Self {
        Self { coord, name: None, address: None }
    }

    pub fn named(coord: Coordinate, name: impl Into<String>) -> Self {
        Self { coord, name: Some(name.into()), address: None }
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("{:.5},{:.5}", self.coord.lat, self.coord.lon),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Armed,
    Triggered,
}

impl From<EngineState> for StateTag {
    fn from(s: EngineState) -> Self {
        match s {
            EngineState::Idle => StateTag::Idle,
            EngineState::Armed => StateTag::Armed,
            EngineState::Triggered => StateTag::Triggered,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub state: EngineState,
    pub distance_m: Option<f64>,
    /// True only for the update that fired the alert.
    pub fired: bool,
    pub message: String,
}

/// Collaborators the engine drives but does not own the lifecycle of.
pub struct Collaborators {
    pub policy: Arc<dyn PolicySource>,
    pub notifier: Arc<dyn Notifier>,
    pub alert: Arc<dyn AlertOutput>,
    pub background: Arc<dyn BackgroundActivity>,
}

/// One-target proximity state machine.
///
/// Transitions run synchronously on the caller. Firing spawns a
/// [`RepeatingAlert`] on the current tokio runtime when there is one.
pub struct ProximityEngine {
    policy: Arc<dyn PolicySource>,
    notifier: Arc<dyn Notifier>,
    alert_out: Arc<dyn AlertOutput>,
    background: Arc<dyn BackgroundActivity>,

    state: EngineState,
    target: Option<Target>,
    has_fired: bool,
    reached: bool,
    keep_alive: bool,
    alert: Option<RepeatingAlert>,

    last_sample: Option<LocationSample>,
    last_distance_m: Option<f64>,
    subscribers: Vec<mpsc::UnboundedSender<EngineEvent>>,
}

impl ProximityEngine {
    pub fn new(c: Collaborators) -> Self {
        Self {
            policy: c.policy,
            notifier: c.notifier,
            alert_out: c.alert,
            background: c.background,
            state: EngineState::Idle,
            target: None,
            has_fired: false,
            reached: false,
            keep_alive: false,
            alert: None,
            last_sample: None,
            last_distance_m: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Sticky arrival flag; only cleared by `arm` or `disarm`.
    pub fn is_reached(&self) -> bool {
        self.reached
    }

    pub fn last_sample(&self) -> Option<&LocationSample> {
        self.last_sample.as_ref()
    }

    pub fn last_distance_m(&self) -> Option<f64> {
        self.last_distance_m
    }

    pub fn is_alerting(&self) -> bool {
        self.alert.as_ref().map(|a| a.is_running()).unwrap_or(false)
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn arm(&mut self, target: Target) {
        self.stop_alert();
        info!("engine: armed for {}", target.label());
        self.target = Some(target);
        self.has_fired = false;
        self.reached = false;
        self.last_distance_m = None;
        self.state = EngineState::Armed;
        self.set_keep_alive(true);
        self.publish(EventKind::Armed);
    }

    pub fn disarm(&mut self) {
        self.stop_alert();
        if let Some(t) = self.target.take() {
            info!("engine: disarmed ({})", t.label());
        }
        self.has_fired = false;
        self.reached = false;
        self.last_distance_m = None;
        self.state = EngineState::Idle;
        self.set_keep_alive(false);
        self.publish(EventKind::Disarmed);
    }

    pub fn reset(&mut self) {
        self.disarm();
    }

    /// Feeds one fix. Returns `None` while idle.
    ///
    /// The fix that fires the alert spawns the repeating pulse on the current
    /// tokio runtime; without one the notification is still posted but no
    /// pulses run.
    pub fn on_location_update(&mut self, sample: LocationSample) -> Option<EngineOutput> {
        let here = sample.coord;
        self.last_sample = Some(sample);

        let target = self.target.as_ref()?.coord;
        let policy = self.policy.policy();
        let d = distance_m(here, target);
        self.last_distance_m = Some(d);

        let inside = d <= policy.radius_m() + RADIUS_EPSILON_M;
        let mut fired = false;

        if self.state == EngineState::Armed && inside && !self.has_fired {
            self.has_fired = true;
            self.reached = true;
            self.state = EngineState::Triggered;
            fired = true;

            info!(
                "engine: arrived within {}m ({}m away), alerting by {} for {}s",
                policy.radius.meters(),
                d as i64,
                policy.modality,
                policy.duration.seconds()
            );
            self.alert = RepeatingAlert::start(
                self.alert_out.clone(),
                policy.modality,
                policy.duration.seconds(),
            );
            self.notifier.post_local_notification(WAKE_UP_TITLE, WAKE_UP_BODY);
        } else {
            debug!("engine: {:?} d={:.1}m radius={}m", self.state, d, policy.radius.meters());
        }

        self.publish(if fired { EventKind::Arrived } else { EventKind::Update });

        let message = match self.state {
            EngineState::Triggered if fired => format!("ARRIVED: {}m from target", d as i64),
            EngineState::Triggered => format!("REACHED: {}m from target", d as i64),
            EngineState::Armed => format!("ARMED: {}m to go (radius {}m)", d as i64, policy.radius.meters()),
            EngineState::Idle => "IDLE".to_string(),
        };

        Some(EngineOutput { state: self.state, distance_m: Some(d), fired, message })
    }

    fn stop_alert(&mut self) {
        if let Some(a) = self.alert.take() {
            a.cancel();
        }
    }

    fn set_keep_alive(&mut self, on: bool) {
        if self.keep_alive == on {
            return;
        }
        self.keep_alive = on;
        self.background.set_keep_alive(on);
    }

    fn publish(&mut self, kind: EventKind) {
        if self.subscribers.is_empty() {
            return;
        }
        let ev = EngineEvent {
            ts_unix_ms: (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
            state: self.state.into(),
            target_lat: self.target.as_ref().map(|t| t.coord.lat),
            target_lon: self.target.as_ref().map(|t| t.coord.lon),
            target_name: self.target.as_ref().and_then(|t| t.name.clone()),
            lat: self.last_sample.as_ref().map(|s| s.coord.lat),
            lon: self.last_sample.as_ref().map(|s| s.coord.lon),
            distance_m: self.last_distance_m,
            reached: self.reached,
        };
        self.subscribers.retain(|tx| tx.send(ev.clone()).is_ok());
    }
}

impl Drop for ProximityEngine {
    fn drop(&mut self) {
        self.stop_alert();
        self.set_keep_alive(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testing::{CountingOutput, RecordingNotifier};
    use crate::background::KeepAliveSwitch;
    use crate::geo::destination_point;
    use crate::policy::{AlertDuration, AlertModality, AlertPolicy, Radius, SharedPolicy};
    use std::time::Duration;

    const KIZILAY: Coordinate = Coordinate::new(39.9208, 32.8541);

    struct Rig {
        engine: ProximityEngine,
        policy: SharedPolicy,
        notifier: Arc<RecordingNotifier>,
        output: Arc<CountingOutput>,
        switch: KeepAliveSwitch,
    }

    fn rig(policy: AlertPolicy) -> Rig {
        let policy = SharedPolicy::new(policy);
        let notifier = Arc::new(RecordingNotifier::default());
        let output = Arc::new(CountingOutput::default());
        let switch = KeepAliveSwitch::default();
        let engine = ProximityEngine::new(Collaborators {
            policy: Arc::new(policy.clone()),
            notifier: notifier.clone(),
            alert: output.clone(),
            background: Arc::new(switch.clone()),
        });
        Rig { engine, policy, notifier, output, switch }
    }

    fn at(meters_north: f64) -> LocationSample {
        LocationSample::now(destination_point(KIZILAY, 0.0, meters_north))
    }

    #[tokio::test]
    async fn idle_engine_ignores_updates() {
        let mut r = rig(AlertPolicy::default());
        assert!(r.engine.on_location_update(at(0.0)).is_none());
        assert_eq!(r.engine.state(), EngineState::Idle);
        assert!(r.engine.last_sample().is_some());
        assert_eq!(r.notifier.count(), 0);
    }

    #[test]
    fn fires_without_runtime_and_still_notifies() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        let out = r.engine.on_location_update(at(10.0)).unwrap();
        assert!(out.fired);
        assert_eq!(out.state, EngineState::Triggered);
        assert!(!r.engine.is_alerting());
        assert_eq!(r.notifier.count(), 1);

        r.engine.on_location_update(at(5.0));
        assert_eq!(r.notifier.count(), 1);
    }

    #[tokio::test]
    async fn fires_once_inside_radius() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));

        let out = r.engine.on_location_update(at(100.0)).unwrap();
        assert!(out.fired);
        assert_eq!(out.state, EngineState::Triggered);
        assert!(r.engine.is_reached());
        assert!(r.engine.is_alerting());
        assert_eq!(r.notifier.count(), 1);
        let posted = r.notifier.posted.lock().unwrap();
        assert_eq!(posted[0].0, WAKE_UP_TITLE);
    }

    #[tokio::test]
    async fn repeated_updates_inside_radius_do_not_refire() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        assert!(r.engine.on_location_update(at(10.0)).unwrap().fired);

        for i in 0..50 {
            let out = r.engine.on_location_update(at(i as f64 * 5.0)).unwrap();
            assert!(!out.fired);
            assert_eq!(out.state, EngineState::Triggered);
        }
        assert_eq!(r.notifier.count(), 1);
    }

    #[tokio::test]
    async fn leaving_radius_keeps_triggered() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        r.engine.on_location_update(at(10.0));

        let out = r.engine.on_location_update(at(5_000.0)).unwrap();
        assert_eq!(out.state, EngineState::Triggered);
        assert!(r.engine.is_reached());

        r.engine.on_location_update(at(10.0));
        assert_eq!(r.notifier.count(), 1);
    }

    #[tokio::test]
    async fn rearm_resets_guard() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        r.engine.on_location_update(at(0.0));
        assert_eq!(r.notifier.count(), 1);

        r.engine.disarm();
        assert_eq!(r.engine.state(), EngineState::Idle);
        assert!(!r.engine.is_reached());
        assert!(r.engine.target().is_none());

        let other = destination_point(KIZILAY, 90.0, 3_000.0);
        r.engine.arm(Target::named(other, "Ulus"));
        let out = r.engine.on_location_update(LocationSample::now(other)).unwrap();
        assert!(out.fired);
        assert_eq!(r.notifier.count(), 2);
    }

    #[tokio::test]
    async fn arming_from_triggered_allows_new_alert() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        r.engine.on_location_update(at(0.0));
        assert_eq!(r.engine.state(), EngineState::Triggered);

        r.engine.arm(Target::new(KIZILAY));
        assert_eq!(r.engine.state(), EngineState::Armed);
        assert!(r.engine.on_location_update(at(0.0)).unwrap().fired);
        assert_eq!(r.notifier.count(), 2);
    }

    #[tokio::test]
    async fn outside_radius_no_transition() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        let out = r.engine.on_location_update(at(2_000.0)).unwrap();
        assert!(!out.fired);
        assert_eq!(out.state, EngineState::Armed);
        assert!(!r.engine.is_reached());
        assert!((out.distance_m.unwrap() - 2_000.0).abs() < 1e-3);
        assert_eq!(r.notifier.count(), 0);
    }

    #[tokio::test]
    async fn radius_boundary_750() {
        let policy = AlertPolicy { radius: Radius::Long, ..Default::default() };

        let mut r = rig(policy);
        r.engine.arm(Target::new(KIZILAY));
        assert!(!r.engine.on_location_update(at(751.0)).unwrap().fired);
        assert!(r.engine.on_location_update(at(750.0)).unwrap().fired);

        let mut r = rig(policy);
        r.engine.arm(Target::new(KIZILAY));
        assert!(r.engine.on_location_update(at(0.0)).unwrap().fired);
    }

    #[tokio::test]
    async fn radius_change_applies_on_next_update() {
        let mut r = rig(AlertPolicy { radius: Radius::Short, ..Default::default() });
        r.engine.arm(Target::new(KIZILAY));

        assert!(!r.engine.on_location_update(at(900.0)).unwrap().fired);
        r.policy.update(|p| p.radius = Radius::VeryLong);
        let out = r.engine.on_location_update(at(900.0)).unwrap();
        assert!(out.fired);

        // shrinking afterwards does not un-trigger
        r.policy.update(|p| p.radius = Radius::Short);
        let out = r.engine.on_location_update(at(900.0)).unwrap();
        assert_eq!(out.state, EngineState::Triggered);
        assert_eq!(r.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn alert_uses_policy_at_fire_time() {
        let mut r = rig(AlertPolicy {
            radius: Radius::Short,
            duration: AlertDuration::Short,
            modality: AlertModality::Sound,
        });
        r.engine.arm(Target::new(KIZILAY));
        r.engine.on_location_update(at(0.0));

        r.policy.update(|p| {
            p.modality = AlertModality::Vibration;
            p.duration = AlertDuration::Long;
        });
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(r.output.sounds.load(std::sync::atomic::Ordering::Relaxed), 5);
        assert_eq!(r.output.vibrations.load(std::sync::atomic::Ordering::Relaxed), 0);
        assert!(!r.engine.is_alerting());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_stops_running_alert() {
        let mut r = rig(AlertPolicy::default());
        r.engine.arm(Target::new(KIZILAY));
        r.engine.on_location_update(at(0.0));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        r.engine.disarm();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(r.output.total(), 3);
    }

    #[tokio::test]
    async fn keep_alive_follows_armed_state() {
        let mut r = rig(AlertPolicy::default());
        assert!(!r.switch.is_on());

        r.engine.arm(Target::new(KIZILAY));
        r.engine.arm(Target::new(KIZILAY));
        assert!(r.switch.is_on());
        assert_eq!(r.switch.flips(), 1);

        r.engine.on_location_update(at(0.0));
        assert!(r.switch.is_on());

        r.engine.disarm();
        r.engine.disarm();
        assert!(!r.switch.is_on());
        assert_eq!(r.switch.flips(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let mut r = rig(AlertPolicy::default());
        let mut rx = r.engine.subscribe();

        r.engine.arm(Target::named(KIZILAY, "Kizilay"));
        r.engine.on_location_update(at(2_000.0));
        r.engine.on_location_update(at(5.0));
        r.engine.disarm();

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Armed, EventKind::Update, EventKind::Arrived, EventKind::Disarmed]
        );
    }

    #[tokio::test]
    async fn arrived_event_carries_target_and_flag() {
        let mut r = rig(AlertPolicy::default());
        let mut rx = r.engine.subscribe();
        r.engine.arm(Target::named(KIZILAY, "Kizilay"));
        r.engine.on_location_update(at(5.0));

        let ev = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.kind == EventKind::Arrived)
            .unwrap();
        assert_eq!(ev.state, StateTag::Triggered);
        assert_eq!(ev.target_name.as_deref(), Some("Kizilay"));
        assert!(ev.reached);
        assert!(ev.distance_m.unwrap() < 10.0);
    }

    #[tokio::test]
    async fn dropping_engine_closes_event_stream_after_disarm() {
        let mut r = rig(AlertPolicy::default());
        let mut rx = r.engine.subscribe();
        r.engine.arm(Target::new(KIZILAY));
        r.engine.disarm();
        drop(r.engine);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(ev.kind);
        }
        assert_eq!(kinds, vec![EventKind::Armed, EventKind::Disarmed]);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let mut r = rig(AlertPolicy::default());
        drop(r.engine.subscribe());
        r.engine.arm(Target::new(KIZILAY));
        assert!(r.engine.subscribers.is_empty());
    }
}
