//! Trip summarization
//!
//! Turns one closed point group into a [`Trip`] record: distance, speeds,
//! harsh event counts, night/peak minutes and the route geometry.

use tracing::debug;
use uuid::Uuid;

use crate::events::EventDetector;
use crate::geo::{polyline_length_km, RouteGeometry};
use crate::segmentation::MIN_POINTS_PER_TRIP;
use crate::temporal::TemporalClassifier;
use crate::types::{RawPoint, Trip};

pub struct TripSummarizer;

impl TripSummarizer {
    /// Summarize an ordered point group.
    ///
    /// Returns `None` for groups with fewer than two points.
    pub fn summarize(points: &[RawPoint]) -> Option<Trip> {
        if points.len() < MIN_POINTS_PER_TRIP {
            return None;
        }
        let first = points.first()?;
        let last = points.last()?;

        let distance_km = polyline_length_km(points.iter().map(RawPoint::position));
        let events = EventDetector::count(points);
        let minutes = TemporalClassifier::minutes(points);

        let trip = Trip {
            id: Uuid::new_v4().to_string(),
            policyholder_id: first.policyholder_id.clone(),
            start_time: first.timestamp,
            end_time: last.timestamp,
            duration_seconds: (last.timestamp - first.timestamp).num_seconds(),
            distance_km,
            avg_speed_kph: mean_speed(points),
            max_speed_kph: max_speed(points),
            harsh_braking_count: events.harsh_braking,
            rapid_acceleration_count: events.rapid_acceleration,
            harsh_cornering_count: events.harsh_cornering,
            night_driving_minutes: minutes.night,
            peak_hour_driving_minutes: minutes.peak,
            route_geometry: RouteGeometry::line_string(points.iter().map(RawPoint::position)),
        };

        debug!(
            trip_id = %trip.id,
            points = points.len(),
            distance_km = trip.distance_km,
            harsh_events = trip.total_harsh_events(),
            "summarized trip"
        );

        Some(trip)
    }
}

/// Mean of the reported speeds, 0 for an empty slice
fn mean_speed(points: &[RawPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.speed_kph).sum::<f64>() / points.len() as f64
}

/// Highest reported speed, truncated to whole km/h
fn max_speed(points: &[RawPoint]) -> u32 {
    let max = points.iter().map(|p| p.speed_kph).fold(0.0_f64, f64::max);
    max.trunc() as u32
}
