//! # Trail Recorder
//!
//! Noise-tolerant GPS trail recording and multi-sample position fusion.
//!
//! This library provides:
//! - A trail recording state machine ([`TrackRecorder`]) that filters noisy fixes,
//!   accumulates distance and elevation, and snapshots itself after every change
//! - A location fuser ([`fusion`]) that turns a short burst of fixes into one
//!   accuracy-weighted position
//! - Ports for the platform services the core needs: a position stream
//!   ([`GeoSampleSource`]), a clock ([`Clock`]) and durable storage ([`SessionStore`])
//!
//! ## Features
//!
//! - **`capture`** (default) - Async, time-bounded position capture on tokio
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trail_recorder::{
//!     GeoSample, ManualClock, MemoryStore, SampleBroadcaster, SampleEvent, TrackRecorder,
//! };
//!
//! let source = Arc::new(SampleBroadcaster::new());
//! let clock = Arc::new(ManualClock::new(0));
//! let recorder = TrackRecorder::new(source.clone(), Arc::new(MemoryStore::new()), clock.clone());
//!
//! recorder.start().unwrap();
//! source.publish(SampleEvent::Fix(GeoSample::new(46.5580, 7.8350, 0).with_accuracy(5.0)));
//! clock.advance(60_000);
//! source.publish(SampleEvent::Fix(GeoSample::new(46.5585, 7.8350, 60_000).with_accuracy(5.0)));
//!
//! let metrics = recorder.metrics();
//! assert_eq!(metrics.point_count, 2);
//! println!("{:.0} m in {} ms", metrics.total_distance_meters, metrics.elapsed_millis);
//! ```

use serde::{Deserialize, Serialize};

pub mod geo_utils;

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod source;
pub use source::{
    GeoSampleSource, PositionError, SampleBroadcaster, SampleEvent, SampleListener, Subscription,
};

pub mod filter;
pub use filter::{FilterConfig, FilterOutcome, PointFilter, Rejection};

pub mod session;
pub use session::{TrackSession, TrackingState};

pub mod accumulator;
pub use accumulator::TrailTotals;

pub mod store;
pub use store::{JsonFileStore, MemoryStore, SessionStore, StorageError};

pub mod recorder;
pub use recorder::{
    EventListener, InvalidTransition, TrackEvent, TrackMetrics, TrackRecorder, TransitionAction,
};

pub mod fusion;
pub use fusion::{fuse_samples, FusedLocation, FusionConfig, FusionError};

#[cfg(feature = "capture")]
pub use fusion::collect_fused_location;

// ============================================================================
// Core Types
// ============================================================================

/// One raw positioning reading, as emitted by the platform.
///
/// # Example
/// ```
/// use trail_recorder::GeoSample;
/// let fix = GeoSample::new(46.5580, 7.8350, 1_700_000_000_000)
///     .with_accuracy(8.0)
///     .with_altitude(1034.0);
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoSample {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal 1-sigma accuracy in meters, if the device reports one
    pub accuracy_meters: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub timestamp_millis: i64,
}

impl GeoSample {
    /// Create a sample without accuracy or altitude.
    pub fn new(lat: f64, lng: f64, timestamp_millis: i64) -> Self {
        Self {
            lat,
            lng,
            accuracy_meters: None,
            altitude_meters: None,
            timestamp_millis,
        }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    pub fn with_altitude(mut self, altitude_meters: f64) -> Self {
        self.altitude_meters = Some(altitude_meters);
        self
    }

    /// Check if the sample has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }

    /// The reported accuracy, only if it is a finite number.
    pub fn known_accuracy(&self) -> Option<f64> {
        self.accuracy_meters.filter(|a| a.is_finite())
    }

    /// The reported altitude, only if it is a finite number.
    pub fn known_altitude(&self) -> Option<f64> {
        self.altitude_meters.filter(|a| a.is_finite())
    }

    /// A copy safe to persist: `None` for invalid coordinates, otherwise
    /// with non-finite accuracy and altitude dropped.
    pub fn sanitized(&self) -> Option<GeoSample> {
        if !self.is_valid() {
            return None;
        }
        Some(Self {
            accuracy_meters: self.known_accuracy(),
            altitude_meters: self.known_altitude(),
            ..*self
        })
    }
}

/// A sample accepted into the trail.
///
/// Accuracy and altitude are sanitized on conversion: anything non-finite
/// becomes `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_meters: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub timestamp_millis: i64,
}

impl From<GeoSample> for TrackPoint {
    fn from(sample: GeoSample) -> Self {
        Self {
            lat: sample.lat,
            lng: sample.lng,
            accuracy_meters: sample.known_accuracy(),
            altitude_meters: sample.known_altitude(),
            timestamp_millis: sample.timestamp_millis,
        }
    }
}

/// Bounding box of a trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
