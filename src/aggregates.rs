//! Profile aggregate recomputation
//!
//! The five derived profile fields are always rebuilt from the complete trip
//! history so that backfills and corrections never leave drift behind. All
//! calendar windows are evaluated in UTC against a caller-supplied `now`.

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::debug;

use crate::types::{ProfileAggregates, Trip};

/// Length of the trip-frequency window and its fixed divisor (days)
pub const DAILY_TRIPS_WINDOW_DAYS: i64 = 30;

/// Result of an aggregate recomputation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateOutcome {
    /// No trip history; the profile keeps its prior values
    NoTrips,
    Updated(ProfileAggregates),
}

pub struct AggregateUpdater;

impl AggregateUpdater {
    /// Recompute the profile aggregates from the full history
    pub fn recompute(trips: &[Trip], now: DateTime<Utc>) -> AggregateOutcome {
        if trips.is_empty() {
            return AggregateOutcome::NoTrips;
        }

        let current_year = now.year();
        let window_start = now - Duration::days(DAILY_TRIPS_WINDOW_DAYS);

        let mut mileage_ytd = 0.0;
        let mut recent_trips = 0usize;
        let mut total_distance = 0.0;
        let mut total_events = 0u64;
        let mut total_minutes = 0.0;
        let mut night_minutes = 0u64;
        let mut peak_minutes = 0u64;

        for trip in trips {
            if trip.start_time.year() == current_year {
                mileage_ytd += trip.distance_km;
            }
            if trip.start_time >= window_start {
                recent_trips += 1;
            }
            total_distance += trip.distance_km;
            total_events += u64::from(trip.total_harsh_events());
            total_minutes += trip.duration_minutes();
            night_minutes += u64::from(trip.night_driving_minutes);
            peak_minutes += u64::from(trip.peak_hour_driving_minutes);
        }

        let aggregates = ProfileAggregates {
            total_mileage_ytd: mileage_ytd,
            avg_daily_trips: recent_trips as f64 / DAILY_TRIPS_WINDOW_DAYS as f64,
            avg_harsh_events_per_100km: per_100km(total_events as f64, total_distance),
            night_driving_percentage: percentage(night_minutes as f64, total_minutes),
            peak_hour_driving_percentage: percentage(peak_minutes as f64, total_minutes),
        };

        debug!(
            trips = trips.len(),
            recent_trips,
            total_distance_km = total_distance,
            "recomputed profile aggregates"
        );

        AggregateOutcome::Updated(aggregates)
    }
}

/// Events per 100 km, 0 when no distance was driven
pub fn per_100km(events: f64, distance_km: f64) -> f64 {
    if distance_km > 0.0 {
        events / distance_km * 100.0
    } else {
        0.0
    }
}

/// Share of `part` in `total` as a percentage clamped to [0, 100].
///
/// Per-point minute credits can exceed the timestamp-derived duration, so the
/// raw ratio is not bounded on its own.
fn percentage(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::RouteGeometry;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn make_trip(start: DateTime<Utc>, distance_km: f64, minutes: i64, events: u32) -> Trip {
        Trip {
            id: format!("trip-{}", start.timestamp()),
            policyholder_id: "PH-1".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            duration_seconds: minutes * 60,
            distance_km,
            avg_speed_kph: 40.0,
            max_speed_kph: 60,
            harsh_braking_count: events,
            rapid_acceleration_count: 0,
            harsh_cornering_count: 0,
            night_driving_minutes: 0,
            peak_hour_driving_minutes: 0,
            route_geometry: RouteGeometry::line_string(Vec::new()),
        }
    }

    #[test]
    fn test_no_trips() {
        assert_eq!(AggregateUpdater::recompute(&[], now()), AggregateOutcome::NoTrips);
    }

    #[test]
    fn test_recompute_fields() {
        let mut recent = make_trip(now() - Duration::days(2), 60.0, 60, 2);
        recent.night_driving_minutes = 15;
        recent.peak_hour_driving_minutes = 30;
        let older = make_trip(now() - Duration::days(40), 40.0, 60, 1);
        let last_year = make_trip(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap(), 100.0, 120, 1);

        let trips = vec![recent, older, last_year];
        let aggregates = match AggregateUpdater::recompute(&trips, now()) {
            AggregateOutcome::Updated(a) => a,
            AggregateOutcome::NoTrips => panic!("expected aggregates"),
        };

        assert!((aggregates.total_mileage_ytd - 100.0).abs() < 0.001);
        assert!((aggregates.avg_daily_trips - 1.0 / 30.0).abs() < 0.001);
        // 4 events over 200 km
        assert!((aggregates.avg_harsh_events_per_100km - 2.0).abs() < 0.001);
        // 15 / 240 and 30 / 240 minutes
        assert!((aggregates.night_driving_percentage - 6.25).abs() < 0.001);
        assert!((aggregates.peak_hour_driving_percentage - 12.5).abs() < 0.001);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let trips = vec![
            make_trip(now() - Duration::days(1), 12.5, 20, 1),
            make_trip(now() - Duration::days(3), 30.0, 35, 0),
        ];
        let first = AggregateUpdater::recompute(&trips, now());
        let second = AggregateUpdater::recompute(&trips, now());
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_denominators_give_zero() {
        let trips = vec![make_trip(now() - Duration::days(1), 0.0, 0, 3)];
        let aggregates = match AggregateUpdater::recompute(&trips, now()) {
            AggregateOutcome::Updated(a) => a,
            AggregateOutcome::NoTrips => panic!("expected aggregates"),
        };
        assert_eq!(aggregates.avg_harsh_events_per_100km, 0.0);
        assert_eq!(aggregates.night_driving_percentage, 0.0);
        assert_eq!(aggregates.peak_hour_driving_percentage, 0.0);
    }

    #[test]
    fn test_percentage_is_clamped() {
        // Two one-minute points spanning 30 seconds
        let mut trip = make_trip(now() - Duration::hours(1), 1.0, 0, 0);
        trip.duration_seconds = 30;
        trip.night_driving_minutes = 2;
        let aggregates = match AggregateUpdater::recompute(&[trip], now()) {
            AggregateOutcome::Updated(a) => a,
            AggregateOutcome::NoTrips => panic!("expected aggregates"),
        };
        assert_eq!(aggregates.night_driving_percentage, 100.0);
    }
}
