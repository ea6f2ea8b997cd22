//! Distance and elevation accumulation.
//!
//! Totals are only ever advanced by accepted points, so they are a pure
//! function of the point log. [`TrailTotals::replay`] recomputes them from the
//! log alone; a restored snapshot can be checked against it.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{elevation_change, point_distance};
use crate::{TrackPoint, TrackSession};

/// Fold one accepted point into the session.
///
/// `displacement` is the distance from the previous accepted point as
/// measured by the filter. A non-finite or negative value counts as zero so
/// the distance total can never decrease.
pub fn accumulate(session: &mut TrackSession, point: TrackPoint, displacement: f64) {
    let step = if displacement.is_finite() && displacement > 0.0 {
        displacement
    } else {
        0.0
    };
    session.total_distance_meters += step;

    let previous_altitude = session.last_accepted_point.and_then(|p| p.altitude_meters);
    let (gain, loss) = elevation_change(previous_altitude, point.altitude_meters);
    session.elevation_gain_meters += gain;
    session.elevation_loss_meters += loss;

    session.points.push(point);
    session.last_accepted_point = Some(point);

    debug!(
        "[Accumulator] point #{}: +{:.1}m (total {:.1}m), +{:.1}/-{:.1}m elevation",
        session.points.len(),
        step,
        session.total_distance_meters,
        gain,
        loss
    );
}

/// Distance and elevation totals of a trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailTotals {
    pub total_distance_meters: f64,
    pub elevation_gain_meters: f64,
    pub elevation_loss_meters: f64,
}

impl TrailTotals {
    /// Recompute totals from an accepted-point sequence.
    ///
    /// # Example
    /// ```
    /// use trail_recorder::{GeoSample, TrackPoint, TrailTotals};
    ///
    /// let points: Vec<TrackPoint> = vec![
    ///     GeoSample::new(46.5580, 7.8350, 0).with_altitude(1000.0).into(),
    ///     GeoSample::new(46.5590, 7.8350, 60_000).with_altitude(1012.0).into(),
    ///     GeoSample::new(46.5600, 7.8350, 120_000).with_altitude(1004.0).into(),
    /// ];
    /// let totals = TrailTotals::replay(&points);
    /// assert_eq!(totals.elevation_gain_meters, 12.0);
    /// assert_eq!(totals.elevation_loss_meters, 8.0);
    /// ```
    pub fn replay(points: &[TrackPoint]) -> Self {
        points.windows(2).fold(Self::default(), |mut totals, w| {
            let (gain, loss) = elevation_change(w[0].altitude_meters, w[1].altitude_meters);
            totals.total_distance_meters += point_distance(&w[0], &w[1]);
            totals.elevation_gain_meters += gain;
            totals.elevation_loss_meters += loss;
            totals
        })
    }

    /// The running totals stored in a session.
    pub fn of(session: &TrackSession) -> Self {
        Self {
            total_distance_meters: session.total_distance_meters,
            elevation_gain_meters: session.elevation_gain_meters,
            elevation_loss_meters: session.elevation_loss_meters,
        }
    }

    /// Whether two sets of totals agree within `tolerance_meters`.
    pub fn approx_eq(&self, other: &Self, tolerance_meters: f64) -> bool {
        (self.total_distance_meters - other.total_distance_meters).abs() <= tolerance_meters
            && (self.elevation_gain_meters - other.elevation_gain_meters).abs() <= tolerance_meters
            && (self.elevation_loss_meters - other.elevation_loss_meters).abs() <= tolerance_meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FilterOutcome, GeoSample, PointFilter};

    /// Run raw samples through the default filter and accumulator.
    fn record(samples: &[GeoSample]) -> (TrackSession, Vec<f64>) {
        let filter = PointFilter::default();
        let mut session = TrackSession::new();
        let mut history = Vec::new();
        for sample in samples {
            if let FilterOutcome::Accept { point, displacement } =
                filter.evaluate(sample, session.last_accepted_point.as_ref())
            {
                accumulate(&mut session, point, displacement);
                history.push(session.total_distance_meters);
            }
        }
        (session, history)
    }

    /// A zig-zagging climb with some noise mixed in.
    fn hike() -> Vec<GeoSample> {
        let mut samples = Vec::new();
        for i in 0..40 {
            let lat = 46.5580 + i as f64 * 0.0002;
            let lng = 7.8350 + if i % 2 == 0 { 0.0 } else { 0.0001 };
            let altitude = 1000.0 + (i as f64 * 1.7) - if i % 5 == 0 { 4.0 } else { 0.0 };
            samples.push(
                GeoSample::new(lat, lng, i * 10_000)
                    .with_accuracy(4.0 + (i % 3) as f64)
                    .with_altitude(altitude),
            );
            // Jitter right next to the fix
            samples.push(
                GeoSample::new(lat + 0.00001, lng, i * 10_000 + 5_000).with_accuracy(5.0),
            );
            // Poor-accuracy outlier
            if i % 7 == 0 {
                samples.push(
                    GeoSample::new(lat + 0.01, lng, i * 10_000 + 6_000).with_accuracy(80.0),
                );
            }
        }
        samples
    }

    #[test]
    fn test_distance_is_monotonic() {
        let (_, history) = record(&hike());
        assert!(history.len() > 10);
        for w in history.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn test_replay_matches_running_totals() {
        let (session, _) = record(&hike());
        let replayed = TrailTotals::replay(&session.points);
        assert!(replayed.approx_eq(&TrailTotals::of(&session), 1e-6));
        assert!(session.elevation_gain_meters > 0.0);
        assert!(session.elevation_loss_meters > 0.0);
    }

    #[test]
    fn test_rejected_samples_do_not_count() {
        let (session, _) = record(&hike());
        assert_eq!(session.points.len(), 40);
    }

    #[test]
    fn test_elevation_requires_both_altitudes() {
        let mut session = TrackSession::new();
        accumulate(&mut session, GeoSample::new(46.0, 7.0, 0).with_altitude(100.0).into(), 0.0);
        accumulate(&mut session, GeoSample::new(46.0001, 7.0, 1).into(), 11.0);
        accumulate(&mut session, GeoSample::new(46.0002, 7.0, 2).with_altitude(150.0).into(), 11.0);
        accumulate(&mut session, GeoSample::new(46.0003, 7.0, 3).with_altitude(140.0).into(), 11.0);

        assert_eq!(session.elevation_gain_meters, 0.0);
        assert_eq!(session.elevation_loss_meters, 10.0);
        assert_eq!(session.total_distance_meters, 33.0);
        assert_eq!(session.points.len(), 4);
        assert_eq!(session.last_accepted_point, session.points.last().copied());
    }

    #[test]
    fn test_bad_displacement_never_decreases_distance() {
        let mut session = TrackSession::new();
        accumulate(&mut session, GeoSample::new(46.0, 7.0, 0).into(), 10.0);
        accumulate(&mut session, GeoSample::new(46.0, 7.0, 1).into(), -3.0);
        accumulate(&mut session, GeoSample::new(46.0, 7.0, 2).into(), f64::NAN);
        assert_eq!(session.total_distance_meters, 10.0);
    }

    #[test]
    fn test_replay_empty() {
        assert_eq!(TrailTotals::replay(&[]), TrailTotals::default());
    }
}
