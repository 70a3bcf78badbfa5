//! Time-of-day classification
//!
//! Labels sample timestamps as night, peak or off-peak by UTC hour. Every
//! classified sample contributes one minute of driving time, which assumes
//! roughly one-minute sampling.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RawPoint;

/// First hour of the night window (inclusive)
pub const NIGHT_START_HOUR: u32 = 22;
/// Last hour of the night window (inclusive)
pub const NIGHT_END_HOUR: u32 = 6;
/// Morning and evening peak windows, inclusive on both ends
pub const PEAK_WINDOWS: [(u32, u32); 2] = [(7, 9), (17, 19)];
/// Minutes credited per classified sample
pub const MINUTES_PER_POINT: u32 = 1;

/// Time-of-day band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    Night,
    Peak,
    OffPeak,
}

impl TimeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBand::Night => "night",
            TimeBand::Peak => "peak",
            TimeBand::OffPeak => "off_peak",
        }
    }
}

/// Night and peak minutes accumulated over a point group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandMinutes {
    pub night: u32,
    pub peak: u32,
}

pub struct TemporalClassifier;

impl TemporalClassifier {
    /// Night covers 22:00-06:59, nine hours in total
    pub fn is_night_hour(hour: u32) -> bool {
        hour >= NIGHT_START_HOUR || hour <= NIGHT_END_HOUR
    }

    pub fn is_peak_hour(hour: u32) -> bool {
        PEAK_WINDOWS
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&hour))
    }

    pub fn classify_hour(hour: u32) -> TimeBand {
        if Self::is_night_hour(hour) {
            TimeBand::Night
        } else if Self::is_peak_hour(hour) {
            TimeBand::Peak
        } else {
            TimeBand::OffPeak
        }
    }

    pub fn classify(timestamp: &DateTime<Utc>) -> TimeBand {
        Self::classify_hour(timestamp.hour())
    }

    /// Sum night and peak minutes over every point (not pairs)
    pub fn minutes(points: &[RawPoint]) -> BandMinutes {
        points
            .iter()
            .fold(BandMinutes::default(), |mut acc, point| {
                let hour = point.timestamp.hour();
                if Self::is_night_hour(hour) {
                    acc.night += MINUTES_PER_POINT;
                }
                if Self::is_peak_hour(hour) {
                    acc.peak += MINUTES_PER_POINT;
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_night_window_wraps_midnight() {
        for hour in [22, 23, 0, 1, 2, 3, 4, 5, 6] {
            assert!(TemporalClassifier::is_night_hour(hour), "hour {hour}");
            assert_eq!(TemporalClassifier::classify_hour(hour), TimeBand::Night);
        }
        assert!(!TemporalClassifier::is_night_hour(7));
        assert!(!TemporalClassifier::is_night_hour(21));
        assert_eq!((0..24).filter(|h| TemporalClassifier::is_night_hour(*h)).count(), 9);
    }

    #[test]
    fn test_peak_windows_inclusive() {
        for hour in [7, 8, 9, 17, 18, 19] {
            assert!(TemporalClassifier::is_peak_hour(hour), "hour {hour}");
        }
        for hour in [6, 10, 16, 20] {
            assert!(!TemporalClassifier::is_peak_hour(hour), "hour {hour}");
        }
        assert_eq!(TemporalClassifier::classify_hour(12), TimeBand::OffPeak);
        assert_eq!(TemporalClassifier::classify_hour(21), TimeBand::OffPeak);
    }

    #[test]
    fn test_classify_uses_utc_hour() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 18, 30, 0).unwrap();
        assert_eq!(TemporalClassifier::classify(&ts), TimeBand::Peak);
        assert_eq!(TemporalClassifier::classify(&ts).as_str(), "peak");
    }

    #[test]
    fn test_minutes_per_point() {
        let make = |hour: u32| RawPoint {
            device_id: "dev-1".to_string(),
            policyholder_id: "PH-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            latitude: 0.0,
            longitude: 0.0,
            speed_kph: 0.0,
            acceleration_x: None,
            acceleration_y: None,
            acceleration_z: None,
            heading_degrees: None,
            odometer_km: None,
            event_type: "normal".to_string(),
            raw_data_payload: None,
        };
        let points = vec![make(5), make(6), make(7), make(8), make(12)];
        assert_eq!(
            TemporalClassifier::minutes(&points),
            BandMinutes { night: 2, peak: 2 }
        );
    }
}
