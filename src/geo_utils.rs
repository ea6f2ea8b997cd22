//! # Geographic Utilities
//!
//! Geographic computations shared by the point filter, the accumulator and the
//! location fuser.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`polyline_length`] | Total length of an accepted-point trail in meters |
//! | [`elevation_change`] | Gain/loss between two optional altitudes |
//! | [`compute_bounds`] | Bounding box of a trail |
//! | [`compute_center`] | Centroid of a trail |
//!
//! ## Example
//!
//! ```rust
//! use trail_recorder::{GeoSample, TrackPoint, geo_utils};
//!
//! let trail: Vec<TrackPoint> = vec![
//!     GeoSample::new(46.5580, 7.8350, 1000).into(),
//!     GeoSample::new(46.5585, 7.8355, 2000).into(),
//!     GeoSample::new(46.5590, 7.8360, 3000).into(),
//! ];
//!
//! let length = geo_utils::polyline_length(&trail);
//! println!("Trail length: {:.0}m", length);
//!
//! let bounds = geo_utils::compute_bounds(&trail).unwrap();
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine formula on a sphere of radius
//! [`EARTH_RADIUS_METERS`] (6,371 km). The filter thresholds are calibrated
//! against this radius, so it is fixed here rather than taken from
//! `geo::Haversine`, which uses the IUGG mean radius.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::{BoundingRect, MultiPoint, Point};

use crate::{Bounds, TrackPoint};

/// Sphere radius used for every distance in this crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two `(lat, lng)` pairs in degrees.
///
/// # Example
///
/// ```rust
/// use trail_recorder::geo_utils;
///
/// // London to Paris is roughly 344 km
/// let d = geo_utils::haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d - 343_500.0).abs() < 1_000.0);
/// ```
#[inline]
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Distance in meters between two accepted points.
#[inline]
pub fn point_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    haversine_distance(a.lat, a.lng, b.lat, b.lng)
}

/// Total length of a trail in meters.
///
/// Sums the haversine distance between consecutive points. Empty or
/// single-point trails return 0.0.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| point_distance(&w[0], &w[1]))
        .sum()
}

/// Elevation change between two optional altitudes as `(gain, loss)`.
///
/// Both altitudes must be present; otherwise nothing is gained or lost.
/// No dead zone is applied.
#[inline]
pub fn elevation_change(previous: Option<f64>, current: Option<f64>) -> (f64, f64) {
    match (previous, current) {
        (Some(prev), Some(curr)) => {
            let dz = curr - prev;
            if dz > 0.0 {
                (dz, 0.0)
            } else if dz < 0.0 {
                (0.0, -dz)
            } else {
                (0.0, 0.0)
            }
        }
        _ => (0.0, 0.0),
    }
}

// =============================================================================
// Bounding Box / Center
// =============================================================================

/// Bounding box of a trail, or `None` for an empty trail.
pub fn compute_bounds(points: &[TrackPoint]) -> Option<Bounds> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.lng, p.lat))
        .collect::<Vec<_>>()
        .into();

    multi.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

/// Arithmetic centroid of a trail, or `None` for an empty trail.
///
/// Suitable for the small areas a single hike covers; not antimeridian-safe.
pub fn compute_center(points: &[TrackPoint]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let sum_lat: f64 = points.iter().map(|p| p.lat).sum();
    let sum_lng: f64 = points.iter().map(|p| p.lng).sum();

    Some((sum_lat / n, sum_lng / n))
}

// =============================================================================
// Unit Tests
// =============================================================================
