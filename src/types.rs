//! Core types for the Driveline pipeline
//!
//! This module defines the value records that flow between stages: raw device
//! points, derived trips, the policyholder profile aggregate and the risk score
//! audit record. Records are immutable once produced; stages return new records
//! instead of patching existing ones.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, RouteGeometry};

/// Neutral prior used for a policyholder with no usable trip history
pub const NEUTRAL_RISK_SCORE: f64 = 0.5;

/// A single timestamped GPS + sensor sample from a telematics device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Device that recorded the sample
    pub device_id: String,
    /// Owner of the device stream
    pub policyholder_id: String,
    /// Sample time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Reported instantaneous speed (km/h, >= 0)
    pub speed_kph: f64,
    /// Longitudinal acceleration (g, signed)
    pub acceleration_x: Option<f64>,
    /// Lateral acceleration (g, signed)
    pub acceleration_y: Option<f64>,
    /// Vertical acceleration (g, signed)
    pub acceleration_z: Option<f64>,
    /// Heading in degrees (0-359)
    pub heading_degrees: Option<u16>,
    /// Vehicle odometer reading (km)
    pub odometer_km: Option<f64>,
    /// Device-side event label ("normal" unless the device flagged something)
    pub event_type: String,
    /// Opaque device payload preserved for transparency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data_payload: Option<serde_json::Value>,
}

impl RawPoint {
    /// Position of the sample
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Summary of one contiguous driving session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Unique trip identifier
    pub id: String,
    pub policyholder_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between first and last point
    pub duration_seconds: i64,
    /// Polyline length of the route (km)
    pub distance_km: f64,
    /// Mean of the reported point speeds (km/h)
    pub avg_speed_kph: f64,
    /// Highest reported point speed, truncated (km/h)
    pub max_speed_kph: u32,
    pub harsh_braking_count: u32,
    pub rapid_acceleration_count: u32,
    pub harsh_cornering_count: u32,
    pub night_driving_minutes: u32,
    pub peak_hour_driving_minutes: u32,
    /// Ordered route as a GeoJSON LineString
    pub route_geometry: RouteGeometry,
}

impl Trip {
    /// Sum of all three harsh event counters
    pub fn total_harsh_events(&self) -> u32 {
        self.harsh_braking_count + self.rapid_acceleration_count + self.harsh_cornering_count
    }

    /// Trip duration in (fractional) minutes
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds as f64 / 60.0
    }
}

/// The five derived fields recomputed from a policyholder's full trip history
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAggregates {
    /// Kilometres driven in trips starting in the current UTC calendar year
    pub total_mileage_ytd: f64,
    /// Trips started in the last 30 days divided by 30
    pub avg_daily_trips: f64,
    /// Harsh events per 100 km over the whole history
    pub avg_harsh_events_per_100km: f64,
    /// Share of driving minutes at night (0-100)
    pub night_driving_percentage: f64,
    /// Share of driving minutes in peak hours (0-100)
    pub peak_hour_driving_percentage: f64,
}

/// Policyholder-level rolling statistics and current risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyholderProfile {
    pub policyholder_id: String,
    pub total_mileage_ytd: f64,
    pub avg_daily_trips: f64,
    pub avg_harsh_events_per_100km: f64,
    pub night_driving_percentage: f64,
    pub peak_hour_driving_percentage: f64,
    /// Current risk score (0-1)
    pub risk_score_current: f64,
    /// When the risk score was last written
    pub last_score_update: Option<DateTime<Utc>>,
}

impl PolicyholderProfile {
    /// Create a profile with zeroed aggregates and the neutral risk prior
    pub fn new(policyholder_id: impl Into<String>) -> Self {
        Self {
            policyholder_id: policyholder_id.into(),
            total_mileage_ytd: 0.0,
            avg_daily_trips: 0.0,
            avg_harsh_events_per_100km: 0.0,
            night_driving_percentage: 0.0,
            peak_hour_driving_percentage: 0.0,
            risk_score_current: NEUTRAL_RISK_SCORE,
            last_score_update: None,
        }
    }

    /// Current aggregate fields
    pub fn aggregates(&self) -> ProfileAggregates {
        ProfileAggregates {
            total_mileage_ytd: self.total_mileage_ytd,
            avg_daily_trips: self.avg_daily_trips,
            avg_harsh_events_per_100km: self.avg_harsh_events_per_100km,
            night_driving_percentage: self.night_driving_percentage,
            peak_hour_driving_percentage: self.peak_hour_driving_percentage,
        }
    }

    /// Return a copy with the five derived fields replaced
    pub fn with_aggregates(&self, aggregates: &ProfileAggregates) -> Self {
        Self {
            total_mileage_ytd: aggregates.total_mileage_ytd,
            avg_daily_trips: aggregates.avg_daily_trips,
            avg_harsh_events_per_100km: aggregates.avg_harsh_events_per_100km,
            night_driving_percentage: aggregates.night_driving_percentage,
            peak_hour_driving_percentage: aggregates.peak_hour_driving_percentage,
            ..self.clone()
        }
    }

    /// Return a copy with the current risk score replaced
    pub fn with_risk_score(&self, risk_score: f64, scored_at: DateTime<Utc>) -> Self {
        Self {
            risk_score_current: risk_score,
            last_score_update: Some(scored_at),
            ..self.clone()
        }
    }
}

/// Inputs that drove a risk score, kept with the audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactors {
    /// Harsh events per 100 km over the scored trips; `None` when no distance
    pub harsh_events_per_100km: Option<f64>,
    /// Number of trips considered
    pub total_trips: usize,
    /// Distance covered by the scored trips (km)
    pub total_distance_km: f64,
    pub harsh_braking: u32,
    pub rapid_acceleration: u32,
    pub harsh_cornering: u32,
}

/// Append-only audit record written on every scoring invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreRecord {
    pub id: String,
    pub policyholder_id: String,
    /// UTC calendar date of the scoring call
    pub score_date: NaiveDate,
    pub risk_score: f64,
    /// Premium delta in percent (negative is a discount)
    pub premium_adjustment_pct: f64,
    pub contributing_factors: ContributingFactors,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_profile_defaults() {
        let profile = PolicyholderProfile::new("PH-1");
        assert_eq!(profile.risk_score_current, NEUTRAL_RISK_SCORE);
        assert_eq!(profile.aggregates(), ProfileAggregates::default());
        assert!(profile.last_score_update.is_none());
    }

    #[test]
    fn test_with_aggregates_preserves_risk() {
        let scored_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let profile = PolicyholderProfile::new("PH-1").with_risk_score(0.2, scored_at);
        let aggregates = ProfileAggregates {
            total_mileage_ytd: 120.0,
            avg_daily_trips: 0.5,
            avg_harsh_events_per_100km: 2.0,
            night_driving_percentage: 10.0,
            peak_hour_driving_percentage: 40.0,
        };

        let updated = profile.with_aggregates(&aggregates);
        assert_eq!(updated.aggregates(), aggregates);
        assert_eq!(updated.risk_score_current, 0.2);
        assert_eq!(updated.last_score_update, Some(scored_at));
        // The source record is untouched
        assert_eq!(profile.total_mileage_ytd, 0.0);
    }
}
