//! # Location Fusion
//!
//! Turns a short burst of fixes into one position estimate for "save this
//! spot".
//!
//! ## Algorithm
//! 1. Collect up to `max_samples` fixes within `window_millis`
//! 2. Pick the reference: the fix with the best (smallest positive) accuracy,
//!    or the first fix when none reports accuracy
//! 3. Quality filter: keep fixes with accuracy ≤ `quality_accuracy_meters`,
//!    unless that would leave nothing
//! 4. Cluster: keep quality fixes within
//!    `max(min_cluster_radius_meters, reference accuracy × cluster_accuracy_factor)`
//!    of the reference, falling back to the reference alone
//! 5. Inverse-variance weighted centroid: `w = 1 / accuracy²`, fused accuracy
//!    `sqrt(1 / Σw)`, altitude averaged over the fixes that report one
//!
//! Steps 2-5 are [`fuse_samples`], a pure function. Step 1 is
//! [`collect_fused_location`] (feature `capture`), which owns its own
//! subscription and deadline and releases both on every exit path.
//!
//! Fusion never touches the recorder's session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo_utils::haversine_distance;
use crate::{GeoSample, PositionError};

/// Configuration for position capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// How long to listen for fixes.
    /// Default: 4500 ms
    pub window_millis: u64,

    /// Stop listening once this many fixes arrived.
    /// Default: 5
    pub max_samples: usize,

    /// Fixes worse than this are dropped, unless every fix is.
    /// Default: 100.0 meters
    pub quality_accuracy_meters: f64,

    /// Lower bound for the cluster radius around the reference fix.
    /// Default: 25.0 meters
    pub min_cluster_radius_meters: f64,

    /// Cluster radius as a multiple of the reference accuracy.
    /// Default: 2.0
    pub cluster_accuracy_factor: f64,

    /// Reference accuracy assumed when the reference reports none.
    /// Default: 25.0 meters
    pub default_reference_accuracy_meters: f64,

    /// Accuracy assumed for weighting when a fix reports none.
    /// Default: 50.0 meters
    pub fallback_accuracy_meters: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            window_millis: 4_500,
            max_samples: 5,
            quality_accuracy_meters: 100.0,
            min_cluster_radius_meters: 25.0,
            cluster_accuracy_factor: 2.0,
            default_reference_accuracy_meters: 25.0,
            fallback_accuracy_meters: 50.0,
        }
    }
}

/// A single fused position estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedLocation {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_meters: f64,
    pub altitude_meters: Option<f64>,
    /// Newest timestamp among the fixes that contributed
    pub timestamp_millis: i64,
    /// Number of fixes that contributed (at least 1)
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FusionError {
    #[error("no accurate position could be determined")]
    NoAccuratePosition,

    #[error("position stream failed: {0}")]
    Position(#[from] PositionError),
}

/// Accuracy usable as a weight: finite and strictly positive.
fn positive_accuracy(sample: &GeoSample) -> Option<f64> {
    sample.known_accuracy().filter(|a| *a > 0.0)
}

/// Fuse already collected fixes into one estimate.
///
/// Fixes with invalid coordinates are ignored; if none remain the result is
/// [`FusionError::NoAccuratePosition`].
///
/// # Example
/// ```
/// use trail_recorder::{fuse_samples, FusionConfig, GeoSample};
///
/// let samples = [
///     GeoSample::new(46.55800, 7.83500, 0).with_accuracy(5.0),
///     GeoSample::new(46.55805, 7.83500, 1000).with_accuracy(10.0),
///     GeoSample::new(46.56500, 7.84000, 2000).with_accuracy(1000.0),
/// ];
/// let fused = fuse_samples(&samples, &FusionConfig::default()).unwrap();
/// assert_eq!(fused.sample_count, 2);
/// assert!((fused.accuracy_meters - 4.472).abs() < 0.001);
/// ```
pub fn fuse_samples(samples: &[GeoSample], config: &FusionConfig) -> Result<FusedLocation, FusionError> {
    let usable: Vec<&GeoSample> = samples.iter().filter(|s| s.is_valid()).collect();
    let Some(&first) = usable.first() else {
        return Err(FusionError::NoAccuratePosition);
    };

    let reference = usable
        .iter()
        .copied()
        .filter_map(|s| positive_accuracy(s).map(|a| (s, a)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(s, _)| s)
        .unwrap_or(first);

    let quality: Vec<&GeoSample> = usable
        .iter()
        .copied()
        .filter(|s| {
            s.known_accuracy()
                .is_some_and(|a| a <= config.quality_accuracy_meters)
        })
        .collect();
    let quality = if quality.is_empty() { usable } else { quality };

    let reference_accuracy =
        positive_accuracy(reference).unwrap_or(config.default_reference_accuracy_meters);
    let threshold = config
        .min_cluster_radius_meters
        .max(reference_accuracy * config.cluster_accuracy_factor);

    let mut cluster: Vec<&GeoSample> = quality
        .into_iter()
        .filter(|s| haversine_distance(reference.lat, reference.lng, s.lat, s.lng) <= threshold)
        .collect();
    if cluster.is_empty() {
        cluster.push(reference);
    }

    let mut weight_sum = 0.0;
    let mut lat_sum = 0.0;
    let mut lng_sum = 0.0;
    let mut altitude_weight_sum = 0.0;
    let mut altitude_sum = 0.0;
    let mut newest = i64::MIN;

    for s in &cluster {
        let accuracy = positive_accuracy(s).unwrap_or(config.fallback_accuracy_meters);
        let w = 1.0 / (accuracy * accuracy);
        weight_sum += w;
        lat_sum += s.lat * w;
        lng_sum += s.lng * w;
        if let Some(altitude) = s.known_altitude() {
            altitude_weight_sum += w;
            altitude_sum += altitude * w;
        }
        newest = newest.max(s.timestamp_millis);
    }

    // Degenerate weights (zero, or overflowed by a near-zero accuracy)
    if !(weight_sum > 0.0 && weight_sum.is_finite()) {
        return Ok(FusedLocation {
            lat: reference.lat,
            lng: reference.lng,
            accuracy_meters: positive_accuracy(reference).unwrap_or(config.fallback_accuracy_meters),
            altitude_meters: reference.known_altitude(),
            timestamp_millis: reference.timestamp_millis,
            sample_count: 1,
        });
    }

    let altitude_meters = if altitude_weight_sum > 0.0 {
        Some(altitude_sum / altitude_weight_sum)
    } else {
        None
    };

    Ok(FusedLocation {
        lat: lat_sum / weight_sum,
        lng: lng_sum / weight_sum,
        accuracy_meters: (1.0 / weight_sum).sqrt(),
        altitude_meters,
        timestamp_millis: newest,
        sample_count: cluster.len(),
    })
}

/// Listen to `source` for a short window and fuse what arrives.
///
/// Collection ends at `max_samples` fixes, at the deadline, or at a stream
/// error. An error before the first fix fails the capture with
/// [`FusionError::Position`]; after at least one fix it only ends collection
/// early. The subscription is cancelled before this returns, and also if the
/// future is dropped mid-capture.
#[cfg(feature = "capture")]
pub async fn collect_fused_location(
    source: &dyn crate::GeoSampleSource,
    config: &FusionConfig,
) -> Result<FusedLocation, FusionError> {
    use log::{debug, warn};
    use tokio::sync::mpsc;
    use tokio::time::{timeout_at, Duration, Instant};

    use crate::SampleEvent;

    let max_samples = config.max_samples.max(1);
    let now = Instant::now();
    // Far-future fallback for windows too large to represent
    let deadline = now
        .checked_add(Duration::from_millis(config.window_millis))
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30));

    let (tx, mut rx) = mpsc::unbounded_channel::<SampleEvent>();
    let subscription = source.subscribe(Box::new(move |event| {
        // Receiver gone means the capture already finished
        let _ = tx.send(event);
    }));

    let mut samples: Vec<GeoSample> = Vec::with_capacity(max_samples);
    let collected: Result<(), FusionError> = loop {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(SampleEvent::Fix(sample))) => {
                samples.push(sample);
                if samples.len() >= max_samples {
                    break Ok(());
                }
            }
            Ok(Some(SampleEvent::Error(error))) => {
                if samples.is_empty() {
                    break Err(error.into());
                }
                warn!(
                    "[Fusion] Stream error after {} fixes, fusing what we have: {}",
                    samples.len(),
                    error
                );
                break Ok(());
            }
            // Source dropped the listener
            Ok(None) => break Ok(()),
            Err(_elapsed) => break Ok(()),
        }
    };
    drop(subscription);
    collected?;

    debug!("[Fusion] Collected {} fixes", samples.len());
    fuse_samples(&samples, config)
}
