//! # Trail Recording
//!
//! [`TrackRecorder`] owns the single live [`TrackSession`] and drives it
//! through `Idle → Recording ⇄ Paused → Finished`.
//!
//! ## Flow
//!
//! 1. `start()` subscribes to the position stream
//! 2. Every fix runs through the [`PointFilter`]; accepted fixes advance the
//!    totals and the session is snapshotted to the [`SessionStore`]
//! 3. `pause()` / `finish()` fold the running time and drop the subscription
//!    before returning
//!
//! The session sits behind one mutex shared by the stream callback and the
//! transition methods. A fix that races with `pause()` either lands before the
//! pause or is ignored because the session is no longer recording.
//!
//! Stream errors and storage failures never change the state. They are logged
//! and passed to the optional [`EventListener`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accumulator::{accumulate, TrailTotals};
use crate::{
    Bounds, Clock, FilterConfig, FilterOutcome, GeoSample, GeoSampleSource, PointFilter,
    PositionError, Rejection, SampleEvent, SessionStore, StorageError, Subscription, TrackPoint,
    TrackSession, TrackingState,
};

// ============================================================================
// Types
// ============================================================================

/// A state transition requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionAction {
    Start,
    Pause,
    Finish,
    Reset,
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionAction::Start => "start",
            TransitionAction::Pause => "pause",
            TransitionAction::Finish => "finish",
            TransitionAction::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// A transition that does not apply in the current state. Nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while {state}")]
pub struct InvalidTransition {
    pub action: TransitionAction,
    pub state: TrackingState,
}

/// Status notifications for UI or diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    StateChanged(TrackingState),
    PointAccepted { point: TrackPoint, total_distance_meters: f64 },
    PointRejected { sample: GeoSample, reason: Rejection },
    PositionError(PositionError),
    /// A snapshot could not be persisted; the in-memory session is unchanged
    StorageFailed(String),
}

/// Receives [`TrackEvent`]s. Called with no recorder lock held.
pub type EventListener = Arc<dyn Fn(&TrackEvent) + Send + Sync>;

/// Derived trail metrics, computed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetrics {
    pub point_count: usize,
    pub total_distance_meters: f64,
    pub elevation_gain_meters: f64,
    pub elevation_loss_meters: f64,
    pub elapsed_millis: i64,
    /// Average speed over recorded time, 0 when no time was recorded
    pub avg_speed_kmh: f64,
}

impl TrackMetrics {
    pub fn from_session(session: &TrackSession, now_millis: i64) -> Self {
        let elapsed_millis = session.elapsed_millis(now_millis);
        let avg_speed_kmh = if elapsed_millis > 0 {
            (session.total_distance_meters / 1000.0) / (elapsed_millis as f64 / 3_600_000.0)
        } else {
            0.0
        };

        Self {
            point_count: session.points.len(),
            total_distance_meters: session.total_distance_meters,
            elevation_gain_meters: session.elevation_gain_meters,
            elevation_loss_meters: session.elevation_loss_meters,
            elapsed_millis,
            avg_speed_kmh,
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct RecorderState {
    session: TrackSession,
    /// Authoritative lifecycle state; derived from the session only on restore
    tracking: TrackingState,
    filter: PointFilter,
    last_status: Option<PositionError>,
    restored: bool,
}

struct Shared {
    state: Mutex<RecorderState>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    listener: Mutex<Option<EventListener>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save a snapshot. Failure is reported, never rolled back.
    fn persist(&self, session: &TrackSession, events: &mut Vec<TrackEvent>) {
        if let Err(e) = self.store.save(session) {
            warn!("[TrackRecorder] Failed to persist snapshot: {}", e);
            events.push(TrackEvent::StorageFailed(e.to_string()));
        }
    }

    fn emit(&self, events: &[TrackEvent]) {
        if events.is_empty() {
            return;
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            for event in events {
                listener(event);
            }
        }
    }

    fn handle_fix(&self, sample: GeoSample) -> Option<FilterOutcome> {
        let mut events = Vec::new();
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;

            if state.tracking != TrackingState::Recording {
                debug!("[TrackRecorder] Ignoring fix while {}", state.tracking);
                return None;
            }

            state.session.last_raw_sample = sample.sanitized();
            let outcome = state
                .filter
                .evaluate(&sample, state.session.last_accepted_point.as_ref());

            match outcome {
                FilterOutcome::Accept { point, displacement } => {
                    accumulate(&mut state.session, point, displacement);
                    events.push(TrackEvent::PointAccepted {
                        point,
                        total_distance_meters: state.session.total_distance_meters,
                    });
                    self.persist(&state.session, &mut events);
                }
                FilterOutcome::Reject(reason) => {
                    debug!("[TrackRecorder] Rejected fix: {}", reason);
                    events.push(TrackEvent::PointRejected { sample, reason });
                }
            }
            outcome
        };

        self.emit(&events);
        Some(outcome)
    }

    fn handle_error(&self, error: PositionError) {
        warn!("[TrackRecorder] Position stream error: {}", error);
        self.lock().last_status = Some(error);
        self.emit(&[TrackEvent::PositionError(error)]);
    }

    fn handle_event(&self, event: SampleEvent) {
        match event {
            SampleEvent::Fix(sample) => {
                self.handle_fix(sample);
            }
            SampleEvent::Error(error) => self.handle_error(error),
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Controller for the single live trail.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use trail_recorder::{ManualClock, MemoryStore, SampleBroadcaster, TrackRecorder, TrackingState};
///
/// let clock = Arc::new(ManualClock::new(0));
/// let recorder = TrackRecorder::new(
///     Arc::new(SampleBroadcaster::new()),
///     Arc::new(MemoryStore::new()),
///     clock.clone(),
/// );
///
/// assert_eq!(recorder.start(), Ok(TrackingState::Recording));
/// clock.advance(10_000);
/// assert_eq!(recorder.pause(), Ok(TrackingState::Paused));
/// assert_eq!(recorder.metrics().elapsed_millis, 10_000);
///
/// // Pausing twice is reported, not fatal
/// assert!(recorder.pause().is_err());
/// ```
pub struct TrackRecorder {
    shared: Arc<Shared>,
    source: Arc<dyn GeoSampleSource>,
    /// The live stream subscription; also serializes transitions
    subscription: Mutex<Option<Subscription>>,
}

impl TrackRecorder {
    pub fn new(
        source: Arc<dyn GeoSampleSource>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RecorderState {
                    session: TrackSession::new(),
                    tracking: TrackingState::Idle,
                    filter: PointFilter::default(),
                    last_status: None,
                    restored: false,
                }),
                store,
                clock,
                listener: Mutex::new(None),
            }),
            source,
            subscription: Mutex::new(None),
        }
    }

    pub fn with_filter_config(self, config: FilterConfig) -> Self {
        self.set_filter_config(config);
        self
    }

    pub fn with_listener(self, listener: EventListener) -> Self {
        self.set_listener(Some(listener));
        self
    }

    pub fn set_filter_config(&self, config: FilterConfig) {
        self.shared.lock().filter = PointFilter::new(config);
    }

    pub fn set_listener(&self, listener: Option<EventListener>) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Begin or resume recording.
    ///
    /// From `Finished` the old trail is discarded first. Resuming from `Paused`
    /// keeps the points and the recorded time.
    pub fn start(&self) -> Result<TrackingState, InvalidTransition> {
        let mut subscription = self.lock_subscription();
        let mut events = Vec::new();
        {
            let mut state = self.shared.lock();
            match state.tracking {
                TrackingState::Recording => {
                    return Err(self.reject(TransitionAction::Start, TrackingState::Recording));
                }
                TrackingState::Finished => {
                    info!("[TrackRecorder] Starting over after a finished trail");
                    state.session.clear();
                }
                TrackingState::Idle => state.session.elapsed_offset_millis = 0,
                TrackingState::Paused => {}
            }

            state.tracking = TrackingState::Recording;
            state.session.active_start_time_millis = Some(self.shared.clock.now_millis());
            self.shared.persist(&state.session, &mut events);

            info!(
                "[TrackRecorder] Recording ({} points, {:.0}m so far)",
                state.session.points.len(),
                state.session.total_distance_meters
            );
        }

        if subscription.is_none() {
            *subscription = Some(self.subscribe());
        }
        drop(subscription);

        events.insert(0, TrackEvent::StateChanged(TrackingState::Recording));
        self.shared.emit(&events);
        Ok(TrackingState::Recording)
    }

    /// Stop recording temporarily. No fix is processed after this returns.
    pub fn pause(&self) -> Result<TrackingState, InvalidTransition> {
        self.stop(TransitionAction::Pause)
    }

    /// End the trail. It stays readable until `reset()` or the next `start()`.
    pub fn finish(&self) -> Result<TrackingState, InvalidTransition> {
        self.stop(TransitionAction::Finish)
    }

    /// Discard the trail and return to `Idle`. Valid in any state.
    pub fn reset(&self) -> Result<TrackingState, InvalidTransition> {
        let mut subscription = self.lock_subscription();
        let mut events = vec![TrackEvent::StateChanged(TrackingState::Idle)];
        {
            let mut state = self.shared.lock();
            let previous = state.tracking;
            state.session.clear();
            state.tracking = TrackingState::Idle;
            state.last_status = None;
            self.shared.persist(&state.session, &mut events);
            info!("[TrackRecorder] Reset trail (was {})", previous);
        }
        subscription.take();
        drop(subscription);

        self.shared.emit(&events);
        Ok(TrackingState::Idle)
    }

    fn stop(&self, action: TransitionAction) -> Result<TrackingState, InvalidTransition> {
        let mut subscription = self.lock_subscription();
        let mut events = Vec::new();
        let next = {
            let mut state = self.shared.lock();
            let current = state.tracking;
            let valid = match action {
                TransitionAction::Pause => current == TrackingState::Recording,
                _ => matches!(current, TrackingState::Recording | TrackingState::Paused),
            };
            if !valid {
                return Err(self.reject(action, current));
            }

            state.session.fold_elapsed(self.shared.clock.now_millis());
            let next = if action == TransitionAction::Finish {
                state.session.finished = true;
                TrackingState::Finished
            } else {
                TrackingState::Paused
            };
            state.tracking = next;
            self.shared.persist(&state.session, &mut events);

            info!(
                "[TrackRecorder] {} → {} ({} points, {:.0}m, {}ms)",
                current,
                next,
                state.session.points.len(),
                state.session.total_distance_meters,
                state.session.elapsed_offset_millis
            );
            next
        };

        // Cancel before returning so no later fix can be delivered
        subscription.take();
        drop(subscription);

        events.insert(0, TrackEvent::StateChanged(next));
        self.shared.emit(&events);
        Ok(next)
    }

    fn reject(&self, action: TransitionAction, state: TrackingState) -> InvalidTransition {
        debug!("[TrackRecorder] Ignoring {} while {}", action, state);
        InvalidTransition { action, state }
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self) -> Subscription {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        self.source.subscribe(Box::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.handle_event(event);
            }
        }))
    }

    // ------------------------------------------------------------------------
    // Stream input
    // ------------------------------------------------------------------------

    /// Feed one fix directly, bypassing the subscription.
    ///
    /// Returns the filter outcome, or `None` when not recording (the fix is
    /// then ignored entirely).
    pub fn on_sample(&self, sample: GeoSample) -> Option<FilterOutcome> {
        self.shared.handle_fix(sample)
    }

    /// Report a stream error. The state does not change.
    pub fn on_position_error(&self, error: PositionError) {
        self.shared.handle_error(error);
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Load the last snapshot from the store.
    ///
    /// Only the first successful call does anything, and only while the
    /// recorder is still `Idle`; later calls return `Ok(false)` and leave the
    /// session untouched. A snapshot saved while recording resumes recording.
    /// Returns whether a snapshot was loaded.
    pub fn restore(&self) -> Result<bool, StorageError> {
        let mut subscription = self.lock_subscription();
        let restored_state = {
            let mut state = self.shared.lock();
            if state.restored {
                return Ok(false);
            }
            if state.tracking != TrackingState::Idle {
                debug!("[TrackRecorder] Skipping restore: session already {}", state.tracking);
                state.restored = true;
                return Ok(false);
            }

            let Some(snapshot) = self.shared.store.load()? else {
                state.restored = true;
                return Ok(false);
            };

            let replayed = TrailTotals::replay(&snapshot.points);
            if !replayed.approx_eq(&TrailTotals::of(&snapshot), 0.01) {
                warn!(
                    "[TrackRecorder] Restored totals differ from point log ({:.1}m stored, {:.1}m replayed)",
                    snapshot.total_distance_meters, replayed.total_distance_meters
                );
            }

            let restored_state = snapshot.state();
            state.session = snapshot;
            state.tracking = restored_state;
            state.restored = true;
            info!(
                "[TrackRecorder] Restored {} trail with {} points",
                restored_state,
                state.session.points.len()
            );
            restored_state
        };

        if restored_state == TrackingState::Recording && subscription.is_none() {
            *subscription = Some(self.subscribe());
        }
        drop(subscription);

        self.shared.emit(&[TrackEvent::StateChanged(restored_state)]);
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn state(&self) -> TrackingState {
        self.shared.lock().tracking
    }

    /// Metrics as of now.
    pub fn metrics(&self) -> TrackMetrics {
        let now = self.shared.clock.now_millis();
        TrackMetrics::from_session(&self.shared.lock().session, now)
    }

    pub fn elapsed_millis(&self) -> i64 {
        let now = self.shared.clock.now_millis();
        self.shared.lock().session.elapsed_millis(now)
    }

    /// A copy of the current session.
    pub fn snapshot(&self) -> TrackSession {
        self.shared.lock().session.clone()
    }

    /// A copy of the accepted points, oldest first.
    pub fn points(&self) -> Vec<TrackPoint> {
        self.shared.lock().session.points.clone()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.shared.lock().session.bounds()
    }

    /// The most recent stream error since the last reset.
    pub fn last_status(&self) -> Option<PositionError> {
        self.shared.lock().last_status
    }

    /// Whether a stream subscription is currently live.
    pub fn is_subscribed(&self) -> bool {
        self.lock_subscription().is_some()
    }
}

impl fmt::Debug for TrackRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackRecorder")
            .field("state", &self.state())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
