//! Geospatial helpers
//!
//! Great-circle distance between GPS fixes and the GeoJSON route geometry
//! attached to each trip.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A (latitude, longitude) pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points using the haversine formula.
///
/// Inputs are in degrees. The result is symmetric in its arguments and exactly
/// zero for identical points.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for near-antipodal points
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Length of the polyline through `points` in order (km)
pub fn polyline_length_km<I>(points: I) -> f64
where
    I: IntoIterator<Item = GeoPoint>,
{
    let mut total = 0.0;
    let mut previous: Option<GeoPoint> = None;
    for point in points {
        if let Some(prev) = previous {
            total += distance_km(prev, point);
        }
        previous = Some(point);
    }
    total
}

/// GeoJSON geometry of a trip route.
///
/// Coordinates are `[longitude, latitude]` pairs in the original point order;
/// the path is never simplified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouteGeometry {
    LineString { coordinates: Vec<[f64; 2]> },
}

impl RouteGeometry {
    /// Build a LineString from points in travel order
    pub fn line_string<I>(points: I) -> Self
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        RouteGeometry::LineString {
            coordinates: points
                .into_iter()
                .map(|p| [p.longitude, p.latitude])
                .collect(),
        }
    }

    pub fn coordinates(&self) -> &[[f64; 2]] {
        match self {
            RouteGeometry::LineString { coordinates } => coordinates,
        }
    }

    pub fn len(&self) -> usize {
        self.coordinates().len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates().is_empty()
    }
}
