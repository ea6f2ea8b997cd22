//! Point acceptance filter.
//!
//! Decides whether a raw fix becomes part of the trail. Rules, in order:
//!
//! 1. Coordinates must be finite and in range
//! 2. A known accuracy worse than `max_accuracy_meters` is rejected
//! 3. The first point of a session is always accepted
//! 4. Displacement from the last accepted point below `min_displacement_meters`
//!    is jitter; above `max_displacement_meters` it is an improbable jump
//!
//! The filter is pure: it never touches session state, and a rejection is an
//! ordinary outcome rather than an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo_utils::haversine_distance;
use crate::{GeoSample, TrackPoint};

/// Thresholds for [`PointFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Samples reporting a worse (larger) accuracy are dropped.
    /// Default: 25.0 meters
    pub max_accuracy_meters: f64,

    /// Movement below this is treated as stationary GPS jitter.
    /// Default: 6.0 meters
    pub min_displacement_meters: f64,

    /// Movement above this between consecutive fixes is treated as a
    /// multipath/teleport artifact.
    /// Default: 150.0 meters
    pub max_displacement_meters: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 25.0,
            min_displacement_meters: 6.0,
            max_displacement_meters: 150.0,
        }
    }
}

/// Why a sample was not added to the trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Error)]
pub enum Rejection {
    #[error("invalid coordinates")]
    InvalidCoordinates,

    #[error("low accuracy ({accuracy_meters:.1}m)")]
    LowAccuracy { accuracy_meters: f64 },

    #[error("below displacement threshold ({displacement_meters:.2}m)")]
    BelowDisplacementThreshold { displacement_meters: f64 },

    #[error("improbable jump ({displacement_meters:.1}m)")]
    ImprobableJump { displacement_meters: f64 },
}

/// Result of running a sample through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutcome {
    /// The sample joins the trail. `displacement` is the distance from the
    /// previous accepted point (0 for the first point).
    Accept { point: TrackPoint, displacement: f64 },
    Reject(Rejection),
}

impl FilterOutcome {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterOutcome::Accept { .. })
    }
}

/// Accuracy and displacement filter for incoming fixes.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    config: FilterConfig,
}

impl PointFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate `sample` against the last accepted point.
    ///
    /// # Example
    /// ```
    /// use trail_recorder::{FilterOutcome, GeoSample, PointFilter, Rejection};
    ///
    /// let filter = PointFilter::default();
    /// let first = GeoSample::new(46.5580, 7.8350, 0).with_accuracy(5.0);
    /// let FilterOutcome::Accept { point, .. } = filter.evaluate(&first, None) else {
    ///     panic!("first fix is always accepted");
    /// };
    ///
    /// // Two meters north: jitter
    /// let jitter = GeoSample::new(46.55802, 7.8350, 1000).with_accuracy(5.0);
    /// assert!(matches!(
    ///     filter.evaluate(&jitter, Some(&point)),
    ///     FilterOutcome::Reject(Rejection::BelowDisplacementThreshold { .. })
    /// ));
    /// ```
    pub fn evaluate(&self, sample: &GeoSample, last_accepted: Option<&TrackPoint>) -> FilterOutcome {
        if !sample.is_valid() {
            return FilterOutcome::Reject(Rejection::InvalidCoordinates);
        }

        // Missing or non-finite accuracy is let through: not every device reports it
        if let Some(accuracy) = sample.known_accuracy() {
            if accuracy > self.config.max_accuracy_meters {
                return FilterOutcome::Reject(Rejection::LowAccuracy { accuracy_meters: accuracy });
            }
        }

        let point = TrackPoint::from(*sample);

        let Some(last) = last_accepted else {
            return FilterOutcome::Accept { point, displacement: 0.0 };
        };

        let displacement = haversine_distance(last.lat, last.lng, sample.lat, sample.lng);
        match self.classify_displacement(displacement) {
            Some(rejection) => FilterOutcome::Reject(rejection),
            None => FilterOutcome::Accept { point, displacement },
        }
    }

    /// Apply the displacement window to an already computed distance.
    /// `None` means the distance is acceptable.
    pub fn classify_displacement(&self, displacement: f64) -> Option<Rejection> {
        if displacement < self.config.min_displacement_meters {
            Some(Rejection::BelowDisplacementThreshold { displacement_meters: displacement })
        } else if displacement > self.config.max_displacement_meters {
            Some(Rejection::ImprobableJump { displacement_meters: displacement })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::EARTH_RADIUS_METERS;

    const ORIGIN_LAT: f64 = 46.5580;
    const ORIGIN_LNG: f64 = 7.8350;

    /// A fix `meters` due north of the origin.
    fn north_of_origin(meters: f64) -> GeoSample {
        let dlat = (meters / EARTH_RADIUS_METERS).to_degrees();
        GeoSample::new(ORIGIN_LAT + dlat, ORIGIN_LNG, 1_000).with_accuracy(5.0)
    }

    fn origin_point() -> TrackPoint {
        GeoSample::new(ORIGIN_LAT, ORIGIN_LNG, 0).with_accuracy(5.0).into()
    }

    #[test]
    fn test_displacement_boundaries() {
        let filter = PointFilter::default();
        assert_eq!(filter.classify_displacement(6.0), None);
        assert_eq!(filter.classify_displacement(150.0), None);
        assert!(matches!(
            filter.classify_displacement(5.999),
            Some(Rejection::BelowDisplacementThreshold { .. })
        ));
        assert!(matches!(
            filter.classify_displacement(150.001),
            Some(Rejection::ImprobableJump { .. })
        ));
    }

    #[test]
    fn test_sample_displacement_window() {
        let filter = PointFilter::default();
        let last = origin_point();

        assert!(filter.evaluate(&north_of_origin(6.01), Some(&last)).is_accept());
        assert!(filter.evaluate(&north_of_origin(149.99), Some(&last)).is_accept());
        assert!(matches!(
            filter.evaluate(&north_of_origin(5.99), Some(&last)),
            FilterOutcome::Reject(Rejection::BelowDisplacementThreshold { .. })
        ));
        assert!(matches!(
            filter.evaluate(&north_of_origin(150.01), Some(&last)),
            FilterOutcome::Reject(Rejection::ImprobableJump { .. })
        ));
    }

    #[test]
    fn test_accept_carries_displacement() {
        let filter = PointFilter::default();
        match filter.evaluate(&north_of_origin(40.0), Some(&origin_point())) {
            FilterOutcome::Accept { displacement, point } => {
                assert!((displacement - 40.0).abs() < 1e-6);
                assert_eq!(point.timestamp_millis, 1_000);
            }
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_accuracy_boundaries() {
        let filter = PointFilter::default();
        let last = origin_point();

        let at_limit = north_of_origin(20.0).with_accuracy(25.0);
        assert!(filter.evaluate(&at_limit, Some(&last)).is_accept());

        let over_limit = north_of_origin(20.0).with_accuracy(25.001);
        assert_eq!(
            filter.evaluate(&over_limit, Some(&last)),
            FilterOutcome::Reject(Rejection::LowAccuracy { accuracy_meters: 25.001 })
        );
    }

    #[test]
    fn test_first_sample_with_bad_accuracy_is_rejected() {
        let filter = PointFilter::default();
        let first = GeoSample::new(ORIGIN_LAT, ORIGIN_LNG, 0).with_accuracy(200.0);
        assert!(matches!(
            filter.evaluate(&first, None),
            FilterOutcome::Reject(Rejection::LowAccuracy { .. })
        ));
    }

    #[test]
    fn test_first_sample_without_known_accuracy_is_accepted() {
        let filter = PointFilter::default();

        let missing = GeoSample::new(ORIGIN_LAT, ORIGIN_LNG, 0);
        assert_eq!(
            filter.evaluate(&missing, None),
            FilterOutcome::Accept { point: missing.into(), displacement: 0.0 }
        );

        let infinite = GeoSample::new(ORIGIN_LAT, ORIGIN_LNG, 0).with_accuracy(f64::INFINITY);
        assert!(filter.evaluate(&infinite, None).is_accept());
    }

    #[test]
    fn test_missing_accuracy_passes_later_samples() {
        let filter = PointFilter::default();
        let mut sample = north_of_origin(30.0);
        sample.accuracy_meters = None;
        assert!(filter.evaluate(&sample, Some(&origin_point())).is_accept());
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let filter = PointFilter::default();
        let bad = GeoSample::new(f64::NAN, ORIGIN_LNG, 0);
        assert_eq!(
            filter.evaluate(&bad, None),
            FilterOutcome::Reject(Rejection::InvalidCoordinates)
        );
    }

    #[test]
    fn test_altitude_sanitized_on_accept() {
        let filter = PointFilter::default();
        let sample = GeoSample::new(ORIGIN_LAT, ORIGIN_LNG, 0).with_altitude(f64::NAN);
        match filter.evaluate(&sample, None) {
            FilterOutcome::Accept { point, .. } => assert_eq!(point.altitude_meters, None),
            other => panic!("expected accept, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_config() {
        let filter = PointFilter::new(FilterConfig {
            min_displacement_meters: 1.0,
            ..FilterConfig::default()
        });
        assert!(filter.evaluate(&north_of_origin(2.0), Some(&origin_point())).is_accept());
    }

    #[test]
    fn test_rejection_display() {
        let r = Rejection::LowAccuracy { accuracy_meters: 42.0 };
        assert_eq!(r.to_string(), "low accuracy (42.0m)");

        let r = Rejection::BelowDisplacementThreshold { displacement_meters: 1.234 };
        assert_eq!(r.to_string(), "below displacement threshold (1.23m)");
        assert_eq!(Rejection::InvalidCoordinates.to_string(), "invalid coordinates");

        let err: Box<dyn std::error::Error> = Box::new(Rejection::ImprobableJump { displacement_meters: 900.0 });
        assert_eq!(err.to_string(), "improbable jump (900.0m)");
    }
}
