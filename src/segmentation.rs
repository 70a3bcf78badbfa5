//! Trip segmentation
//!
//! Splits a time-ordered point stream into trips wherever consecutive samples
//! are more than ten minutes apart.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TelematicsError;
use crate::types::RawPoint;

/// Inactivity gap above which the current trip is closed (seconds)
pub const MAX_GAP_SECONDS: i64 = 600;
/// Groups smaller than this are dropped as isolated pings
pub const MIN_POINTS_PER_TRIP: usize = 2;

/// Closed time range used to select points for trip processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TripWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering the `hours` leading up to `now`.
    ///
    /// Fails with [`TelematicsError::Config`] when the start would fall
    /// outside the representable time range.
    pub fn lookback(now: DateTime<Utc>, hours: i64) -> Result<Self, TelematicsError> {
        let start = Duration::try_hours(hours)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                TelematicsError::Config(format!("lookback of {hours} hours is out of range"))
            })?;
        Ok(Self { start, end: now })
    }

    /// Both ends are inclusive
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp <= self.end
    }
}

pub struct TripSegmenter;

impl TripSegmenter {
    /// Split `points` into trip groups.
    ///
    /// Input must already be ordered by timestamp; the segmenter does not
    /// sort. A decreasing timestamp fails with [`TelematicsError::OutOfOrder`].
    /// Equal timestamps are accepted. Groups with a single point are dropped.
    pub fn segment(points: &[RawPoint]) -> Result<Vec<&[RawPoint]>, TelematicsError> {
        let max_gap = Duration::seconds(MAX_GAP_SECONDS);
        let mut groups = Vec::new();
        let mut group_start = 0;

        for index in 1..points.len() {
            let previous = points[index - 1].timestamp;
            let current = points[index].timestamp;

            if current < previous {
                return Err(TelematicsError::OutOfOrder {
                    index,
                    previous,
                    current,
                });
            }

            if current - previous > max_gap {
                Self::close(&points[group_start..index], &mut groups);
                group_start = index;
            }
        }

        if group_start < points.len() {
            Self::close(&points[group_start..], &mut groups);
        }

        Ok(groups)
    }

    /// Number of leading points that belong to groups already closed at `now`.
    ///
    /// The trailing group stays open until `now` is more than
    /// [`MAX_GAP_SECONDS`] past its last point. Input must be ordered.
    pub fn closed_len(points: &[RawPoint], now: DateTime<Utc>) -> usize {
        let max_gap = Duration::seconds(MAX_GAP_SECONDS);
        let Some(last) = points.last() else {
            return 0;
        };
        if now - last.timestamp > max_gap {
            return points.len();
        }
        points
            .windows(2)
            .rposition(|pair| pair[1].timestamp - pair[0].timestamp > max_gap)
            .map_or(0, |index| index + 1)
    }

    fn close<'a>(group: &'a [RawPoint], groups: &mut Vec<&'a [RawPoint]>) {
        if group.len() >= MIN_POINTS_PER_TRIP {
            groups.push(group);
        } else if let Some(point) = group.first() {
            debug!(
                policyholder_id = %point.policyholder_id,
                timestamp = %point.timestamp,
                "dropping single-point segment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn make_points(offsets: &[i64]) -> Vec<RawPoint> {
        offsets
            .iter()
            .map(|secs| RawPoint {
                device_id: "dev-1".to_string(),
                policyholder_id: "PH-1".to_string(),
                timestamp: base_time() + Duration::seconds(*secs),
                latitude: 37.0,
                longitude: -122.0,
                speed_kph: 30.0,
                acceleration_x: None,
                acceleration_y: None,
                acceleration_z: None,
                heading_degrees: None,
                odometer_km: None,
                event_type: "normal".to_string(),
                raw_data_payload: None,
            })
            .collect()
    }

    fn offsets(group: &[RawPoint]) -> Vec<i64> {
        group
            .iter()
            .map(|p| (p.timestamp - base_time()).num_seconds())
            .collect()
    }

    #[test]
    fn test_gap_splits_into_two_trips() {
        let points = make_points(&[0, 30, 700, 730]);
        let groups = TripSegmenter::segment(&points).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(offsets(groups[0]), vec![0, 30]);
        assert_eq!(offsets(groups[1]), vec![700, 730]);
    }

    #[test]
    fn test_trailing_single_point_is_dropped() {
        let points = make_points(&[0, 30, 60, 1000]);
        let groups = TripSegmenter::segment(&points).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(offsets(groups[0]), vec![0, 30, 60]);
    }

    #[test]
    fn test_leading_single_point_is_dropped() {
        let points = make_points(&[0, 900, 960]);
        let groups = TripSegmenter::segment(&points).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(offsets(groups[0]), vec![900, 960]);
    }

    #[test]
    fn test_gap_of_exactly_threshold_does_not_split() {
        let points = make_points(&[0, 600, 1200]);
        let groups = TripSegmenter::segment(&points).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn test_empty_and_single_inputs() {
        assert!(TripSegmenter::segment(&[]).unwrap().is_empty());
        assert!(TripSegmenter::segment(&make_points(&[0])).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_order_fails_fast() {
        let points = make_points(&[0, 60, 30]);
        match TripSegmenter::segment(&points) {
            Err(TelematicsError::OutOfOrder { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected OutOfOrder, got {other:?}"),
        }
    }

    #[test]
    fn test_window_is_inclusive() {
        let now = base_time();
        let window = TripWindow::lookback(now, 24).unwrap();
        assert!(window.contains(&now));
        assert!(window.contains(&(now - Duration::hours(24))));
        assert!(!window.contains(&(now - Duration::hours(24) - Duration::seconds(1))));
        assert!(!window.contains(&(now + Duration::seconds(1))));
    }

    #[test]
    fn test_lookback_out_of_range_is_an_error() {
        assert!(matches!(
            TripWindow::lookback(base_time(), 3_000_000_000),
            Err(TelematicsError::Config(_))
        ));
        assert!(TripWindow::lookback(base_time(), i64::MAX).is_err());
    }

    #[test]
    fn test_closed_len_holds_back_open_tail() {
        let points = make_points(&[0, 30, 1000, 1030]);
        // Last point only 60 s ago: the second group is still open
        assert_eq!(TripSegmenter::closed_len(&points, base_time() + Duration::seconds(1090)), 2);
        // More than ten minutes later everything is closed
        assert_eq!(TripSegmenter::closed_len(&points, base_time() + Duration::seconds(1700)), 4);
        // A single open group leaves nothing closed
        assert_eq!(TripSegmenter::closed_len(&points[..2], base_time() + Duration::seconds(60)), 0);
        assert_eq!(TripSegmenter::closed_len(&[], base_time()), 0);
    }
}
