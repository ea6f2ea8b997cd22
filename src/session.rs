//! The recorded trail and its timing, as one plain value.
//!
//! [`TrackSession`] is exactly what gets persisted. The recording state is not
//! part of the snapshot; on restore it is derived from the fields (see
//! [`TrackSession::state`]). While live, the recorder tracks it explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{geo_utils, Bounds, GeoSample, TrackPoint};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    Idle,
    Recording,
    Paused,
    Finished,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Recording => "recording",
            TrackingState::Paused => "paused",
            TrackingState::Finished => "finished",
        }
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded trail plus running totals.
///
/// Serialized with camelCase keys; this is the snapshot format written by
/// every [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSession {
    /// Accepted points, oldest first
    pub points: Vec<TrackPoint>,
    pub total_distance_meters: f64,
    pub elevation_gain_meters: f64,
    pub elevation_loss_meters: f64,
    /// Recorded time from completed Recording stretches
    pub elapsed_offset_millis: i64,
    /// Start of the current Recording stretch, `None` unless recording
    pub active_start_time_millis: Option<i64>,
    /// Most recent raw sample, accepted or not (diagnostics)
    pub last_raw_sample: Option<GeoSample>,
    pub last_accepted_point: Option<TrackPoint>,
    pub finished: bool,
}

impl TrackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the lifecycle state from the stored fields.
    ///
    /// A session paused before any time or point was recorded reads as `Idle`.
    pub fn state(&self) -> TrackingState {
        if self.finished {
            TrackingState::Finished
        } else if self.active_start_time_millis.is_some() {
            TrackingState::Recording
        } else if !self.points.is_empty() || self.elapsed_offset_millis > 0 {
            TrackingState::Paused
        } else {
            TrackingState::Idle
        }
    }

    /// Recorded time as of `now_millis`.
    ///
    /// Computed on read so timer jitter can never accumulate. A clock that
    /// went backwards contributes nothing for the current stretch.
    pub fn elapsed_millis(&self, now_millis: i64) -> i64 {
        let running = self
            .active_start_time_millis
            .map(|start| (now_millis - start).max(0))
            .unwrap_or(0);
        self.elapsed_offset_millis + running
    }

    /// Close the current Recording stretch into `elapsed_offset_millis`.
    pub(crate) fn fold_elapsed(&mut self, now_millis: i64) {
        if let Some(start) = self.active_start_time_millis.take() {
            self.elapsed_offset_millis += (now_millis - start).max(0);
        }
    }

    /// Drop all points and totals.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of the accepted points.
    pub fn bounds(&self) -> Option<Bounds> {
        geo_utils::compute_bounds(&self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_derivation() {
        let mut session = TrackSession::new();
        assert_eq!(session.state(), TrackingState::Idle);

        session.active_start_time_millis = Some(0);
        assert_eq!(session.state(), TrackingState::Recording);

        session.fold_elapsed(500);
        assert_eq!(session.state(), TrackingState::Paused);

        session.finished = true;
        assert_eq!(session.state(), TrackingState::Finished);

        session.clear();
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn test_paused_with_points_but_no_time() {
        let mut session = TrackSession::new();
        session.points.push(GeoSample::new(46.5, 7.8, 0).into());
        assert_eq!(session.state(), TrackingState::Paused);
    }

    #[test]
    fn test_elapsed_is_computed_on_read() {
        let mut session = TrackSession::new();
        session.elapsed_offset_millis = 1_000;
        session.active_start_time_millis = Some(10_000);

        assert_eq!(session.elapsed_millis(10_000), 1_000);
        assert_eq!(session.elapsed_millis(12_500), 3_500);
        // Clock stepped backwards
        assert_eq!(session.elapsed_millis(9_000), 1_000);
    }

    #[test]
    fn test_fold_elapsed_only_when_active() {
        let mut session = TrackSession::new();
        session.fold_elapsed(5_000);
        assert_eq!(session.elapsed_offset_millis, 0);

        session.active_start_time_millis = Some(1_000);
        session.fold_elapsed(5_000);
        assert_eq!(session.elapsed_offset_millis, 4_000);
        assert_eq!(session.active_start_time_millis, None);
    }

    #[test]
    fn test_snapshot_keys_are_camel_case() {
        let json = serde_json::to_value(TrackSession::new()).unwrap();
        for key in [
            "points",
            "totalDistanceMeters",
            "elevationGainMeters",
            "elevationLossMeters",
            "elapsedOffsetMillis",
            "activeStartTimeMillis",
            "lastRawSample",
            "lastAcceptedPoint",
            "finished",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json.as_object().unwrap().len(), 9);
    }
}
