//! Risk scoring and premium adjustment
//!
//! Risk is a linear function of harsh events per 100 km over the most recent
//! trips, saturating at 10 events per 100 km. The premium map is fixed:
//! risk 0 gives a 20% discount and risk 1 a 30% surcharge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::aggregates::per_100km;
use crate::types::{
    ContributingFactors, PolicyholderProfile, RiskScoreRecord, Trip, NEUTRAL_RISK_SCORE,
};

/// Number of most recent trips considered
pub const RECENT_TRIP_LIMIT: usize = 30;
/// Harsh events per 100 km at which risk saturates at 1.0
pub const RISK_SATURATION_EVENTS_PER_100KM: f64 = 10.0;
/// Premium adjustment at risk 0 (percent)
pub const PREMIUM_BASE_PCT: f64 = -20.0;
/// Premium adjustment added per unit of risk (percent)
pub const PREMIUM_SLOPE_PCT: f64 = 50.0;

/// Premium delta in percent for a risk score
pub fn premium_adjustment(risk_score: f64) -> f64 {
    PREMIUM_BASE_PCT + PREMIUM_SLOPE_PCT * risk_score
}

/// Output of one scoring invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Audit record to append to the policyholder's history
    pub record: RiskScoreRecord,
    /// Profile with the current score and timestamp replaced
    pub profile: PolicyholderProfile,
}

impl RiskAssessment {
    pub fn risk_score(&self) -> f64 {
        self.record.risk_score
    }

    pub fn premium_adjustment_pct(&self) -> f64 {
        self.record.premium_adjustment_pct
    }
}

pub struct RiskScorer;

impl RiskScorer {
    /// Up to [`RECENT_TRIP_LIMIT`] trips, newest first
    pub fn recent_trips(trips: &[Trip]) -> Vec<&Trip> {
        let mut recent: Vec<&Trip> = trips.iter().collect();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(RECENT_TRIP_LIMIT);
        recent
    }

    /// Risk score and contributing factors for a set of trips.
    ///
    /// No trips, or trips with no distance, yield the neutral score.
    pub fn evaluate(trips: &[&Trip]) -> (f64, ContributingFactors) {
        let total_distance_km: f64 = trips.iter().map(|t| t.distance_km).sum();
        let harsh_braking: u32 = trips.iter().map(|t| t.harsh_braking_count).sum();
        let rapid_acceleration: u32 = trips.iter().map(|t| t.rapid_acceleration_count).sum();
        let harsh_cornering: u32 = trips.iter().map(|t| t.harsh_cornering_count).sum();
        let total_events = harsh_braking + rapid_acceleration + harsh_cornering;

        let harsh_events_per_100km = if total_distance_km > 0.0 {
            Some(per_100km(f64::from(total_events), total_distance_km))
        } else {
            None
        };

        let risk_score = match harsh_events_per_100km {
            Some(rate) if !trips.is_empty() => {
                (rate / RISK_SATURATION_EVENTS_PER_100KM).clamp(0.0, 1.0)
            }
            _ => NEUTRAL_RISK_SCORE,
        };

        let factors = ContributingFactors {
            harsh_events_per_100km,
            total_trips: trips.len(),
            total_distance_km,
            harsh_braking,
            rapid_acceleration,
            harsh_cornering,
        };

        (risk_score, factors)
    }

    /// Score a policyholder from its trip history.
    ///
    /// Always produces a new audit record; same-day records are not merged.
    pub fn score(
        profile: &PolicyholderProfile,
        trips: &[Trip],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let recent = Self::recent_trips(trips);
        let (risk_score, contributing_factors) = Self::evaluate(&recent);
        let premium_adjustment_pct = premium_adjustment(risk_score);

        info!(
            policyholder_id = %profile.policyholder_id,
            trips = recent.len(),
            risk_score,
            premium_adjustment_pct,
            "scored policyholder"
        );

        let record = RiskScoreRecord {
            id: Uuid::new_v4().to_string(),
            policyholder_id: profile.policyholder_id.clone(),
            score_date: now.date_naive(),
            risk_score,
            premium_adjustment_pct,
            contributing_factors,
            created_at: now,
        };

        RiskAssessment {
            record,
            profile: profile.with_risk_score(risk_score, now),
        }
    }
}
