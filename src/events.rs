//! Harsh event detection
//!
//! Classifies each consecutive pair of samples within a trip into harsh
//! braking, rapid acceleration and harsh cornering. Thresholds are in g.

use serde::{Deserialize, Serialize};

use crate::types::RawPoint;

/// Minimum change in longitudinal acceleration between samples to consider
/// a braking or acceleration event
pub const LONGITUDINAL_DELTA_THRESHOLD: f64 = 0.3;
/// Current longitudinal acceleration below which the event is braking
pub const HARSH_BRAKING_THRESHOLD: f64 = -0.2;
/// Current longitudinal acceleration above which the event is acceleration
pub const RAPID_ACCELERATION_THRESHOLD: f64 = 0.2;
/// Absolute lateral acceleration above which the sample is harsh cornering
pub const HARSH_CORNERING_THRESHOLD: f64 = 0.3;

/// Events raised by a single (previous, current) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectedEvents {
    pub harsh_braking: bool,
    pub rapid_acceleration: bool,
    pub harsh_cornering: bool,
}

impl DetectedEvents {
    pub fn any(&self) -> bool {
        self.harsh_braking || self.rapid_acceleration || self.harsh_cornering
    }
}

/// Running totals across a trip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarshEventCounts {
    pub harsh_braking: u32,
    pub rapid_acceleration: u32,
    pub harsh_cornering: u32,
}

impl HarshEventCounts {
    pub fn record(&mut self, events: DetectedEvents) {
        self.harsh_braking += u32::from(events.harsh_braking);
        self.rapid_acceleration += u32::from(events.rapid_acceleration);
        self.harsh_cornering += u32::from(events.harsh_cornering);
    }

    pub fn total(&self) -> u32 {
        self.harsh_braking + self.rapid_acceleration + self.harsh_cornering
    }
}

/// Pairwise harsh event classifier
pub struct EventDetector;

impl EventDetector {
    /// Classify the transition from `previous` to `current`.
    ///
    /// Braking/acceleration requires `acceleration_x` on both samples and a
    /// delta above the threshold; the direction is decided by the current
    /// sample's value, not the delta. Cornering looks only at the current
    /// sample's `acceleration_y` and can fire alongside either of the others.
    /// Missing fields never raise anything.
    pub fn detect(previous: &RawPoint, current: &RawPoint) -> DetectedEvents {
        let mut events = DetectedEvents::default();

        if let (Some(prev_ax), Some(curr_ax)) = (previous.acceleration_x, current.acceleration_x) {
            if (curr_ax - prev_ax).abs() > LONGITUDINAL_DELTA_THRESHOLD {
                if curr_ax < HARSH_BRAKING_THRESHOLD {
                    events.harsh_braking = true;
                } else if curr_ax > RAPID_ACCELERATION_THRESHOLD {
                    events.rapid_acceleration = true;
                }
            }
        }

        if let Some(ay) = current.acceleration_y {
            if ay.abs() > HARSH_CORNERING_THRESHOLD {
                events.harsh_cornering = true;
            }
        }

        events
    }

    /// Count events over every consecutive pair of an ordered point group
    pub fn count(points: &[RawPoint]) -> HarshEventCounts {
        let mut counts = HarshEventCounts::default();
        for pair in points.windows(2) {
            counts.record(Self::detect(&pair[0], &pair[1]));
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn make_point(ax: Option<f64>, ay: Option<f64>) -> RawPoint {
        RawPoint {
            device_id: "dev-1".to_string(),
            policyholder_id: "PH-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            latitude: 37.0,
            longitude: -122.0,
            speed_kph: 40.0,
            acceleration_x: ax,
            acceleration_y: ay,
            acceleration_z: None,
            heading_degrees: None,
            odometer_km: None,
            event_type: "normal".to_string(),
            raw_data_payload: None,
        }
    }

    #[test]
    fn test_braking_sequence() {
        let points: Vec<RawPoint> = [0.0, 0.25, -0.35]
            .iter()
            .map(|ax| make_point(Some(*ax), None))
            .collect();

        // 0.0 -> 0.25: delta 0.25 does not trigger
        assert_eq!(EventDetector::detect(&points[0], &points[1]), DetectedEvents::default());

        // 0.25 -> -0.35: delta 0.6, current below -0.2
        let events = EventDetector::detect(&points[1], &points[2]);
        assert!(events.harsh_braking);
        assert!(!events.rapid_acceleration);

        assert_eq!(
            EventDetector::count(&points),
            HarshEventCounts {
                harsh_braking: 1,
                rapid_acceleration: 0,
                harsh_cornering: 0,
            }
        );
    }

    #[test]
    fn test_rapid_acceleration() {
        let prev = make_point(Some(-0.1), None);
        let curr = make_point(Some(0.25), None);
        let events = EventDetector::detect(&prev, &curr);
        assert!(events.rapid_acceleration);
        assert!(!events.harsh_braking);
    }

    #[test]
    fn test_large_delta_with_small_current_value_is_not_an_event() {
        // Delta 0.45 but current value 0.1 is inside both thresholds
        let prev = make_point(Some(-0.35), None);
        let curr = make_point(Some(0.1), None);
        assert!(!EventDetector::detect(&prev, &curr).any());
    }

    #[test]
    fn test_zero_acceleration_is_a_reading() {
        // A 0.0 reading is present data, not a missing field
        let prev = make_point(Some(0.0), None);
        let curr = make_point(Some(0.4), None);
        assert!(EventDetector::detect(&prev, &curr).rapid_acceleration);
    }

    #[test]
    fn test_missing_acceleration_raises_nothing() {
        let prev = make_point(None, None);
        let curr = make_point(Some(-0.9), None);
        assert!(!EventDetector::detect(&prev, &curr).any());

        let prev = make_point(Some(0.5), None);
        let curr = make_point(None, None);
        assert!(!EventDetector::detect(&prev, &curr).any());
    }

    #[test]
    fn test_cornering_independent_of_braking() {
        let prev = make_point(Some(0.2), None);
        let curr = make_point(Some(-0.4), Some(-0.5));
        let events = EventDetector::detect(&prev, &curr);
        assert!(events.harsh_braking);
        assert!(events.harsh_cornering);

        let mut counts = HarshEventCounts::default();
        counts.record(events);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_cornering_uses_current_sample_only() {
        let prev = make_point(None, Some(0.9));
        let curr = make_point(None, Some(0.1));
        assert!(!EventDetector::detect(&prev, &curr).harsh_cornering);

        let curr = make_point(None, Some(0.31));
        assert!(EventDetector::detect(&prev, &curr).harsh_cornering);
    }
}
