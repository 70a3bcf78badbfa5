//! Driver rewards
//!
//! Achievement and tip evaluation, the driver scorecard, challenge progress
//! and the immediate risk impact of a single reported event. All criteria are
//! read from [`RewardRules`]; display text is left to the presentation layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{RewardRules, ScorecardConstants};
use crate::context::Priority;
use crate::types::{PolicyholderProfile, Trip};

/// Days in the clean-driving challenge
pub const CLEAN_WEEK_DAYS: i64 = 7;
/// Night share the night-driving challenge aims for (percent)
pub const NIGHT_CHALLENGE_TARGET_PCT: f64 = 10.0;
/// Night share assumed at the start of the night-driving challenge (percent)
pub const NIGHT_CHALLENGE_BASELINE_PCT: f64 = 20.0;

/// Profile quantity a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMetric {
    RiskScore,
    HarshEventsPer100km,
    NightDrivingPct,
    PeakDrivingPct,
    DailyTrips,
    /// Daily trip rate scaled to a 30-day month
    MonthlyTrips,
    MileageYtd,
}

impl ProfileMetric {
    pub fn value(&self, profile: &PolicyholderProfile) -> f64 {
        match self {
            ProfileMetric::RiskScore => profile.risk_score_current,
            ProfileMetric::HarshEventsPer100km => profile.avg_harsh_events_per_100km,
            ProfileMetric::NightDrivingPct => profile.night_driving_percentage,
            ProfileMetric::PeakDrivingPct => profile.peak_hour_driving_percentage,
            ProfileMetric::DailyTrips => profile.avg_daily_trips,
            ProfileMetric::MonthlyTrips => profile.avg_daily_trips * 30.0,
            ProfileMetric::MileageYtd => profile.total_mileage_ytd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    AtMost,
    AtLeast,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::AtMost => value <= threshold,
            Comparison::AtLeast => value >= threshold,
        }
    }
}

/// Severity of a reported driving event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementStatus {
    pub id: String,
    pub earned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingTip {
    pub id: String,
    pub priority: Priority,
}

/// Tip returned when no rule fires
pub const KEEP_IT_UP_TIP: &str = "keep_it_up";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverScorecard {
    pub policyholder_id: String,
    pub overall_score: f64,
    pub safety_score: f64,
    pub efficiency_score: f64,
    pub consistency_score: f64,
    pub total_points: u64,
    /// Ids of earned achievements
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub current: f64,
    pub target: f64,
    /// Completion in [0, 100]
    pub percentage: f64,
}

impl ChallengeProgress {
    pub fn is_completed(&self) -> bool {
        self.percentage >= 100.0
    }
}

/// Reward calculator over a rule table
pub struct RewardsEngine<'a> {
    rules: &'a RewardRules,
}

impl<'a> RewardsEngine<'a> {
    pub fn new(rules: &'a RewardRules) -> Self {
        Self { rules }
    }

    pub fn achievements(&self, profile: &PolicyholderProfile) -> Vec<AchievementStatus> {
        self.rules
            .achievements
            .iter()
            .map(|rule| AchievementStatus {
                id: rule.id.clone(),
                earned: rule
                    .comparison
                    .holds(rule.metric.value(profile), rule.threshold),
            })
            .collect()
    }

    pub fn earned_achievements(&self, profile: &PolicyholderProfile) -> Vec<String> {
        self.achievements(profile)
            .into_iter()
            .filter(|a| a.earned)
            .map(|a| a.id)
            .collect()
    }

    /// Tips whose metric is above threshold, or a single low-priority
    /// encouragement when none apply
    pub fn tips(&self, profile: &PolicyholderProfile) -> Vec<DrivingTip> {
        let tips: Vec<DrivingTip> = self
            .rules
            .tips
            .iter()
            .filter(|rule| rule.metric.value(profile) > rule.threshold)
            .map(|rule| DrivingTip {
                id: rule.id.clone(),
                priority: rule.priority,
            })
            .collect();

        if tips.is_empty() {
            vec![DrivingTip {
                id: KEEP_IT_UP_TIP.to_string(),
                priority: Priority::Low,
            }]
        } else {
            tips
        }
    }

    pub fn scorecard(&self, profile: &PolicyholderProfile) -> DriverScorecard {
        let c = &self.rules.scorecard;
        let safety = safety_score(c, profile);
        let efficiency = efficiency_score(c, profile);
        let consistency = consistency_score(c, profile);
        let overall = safety * c.safety_weight
            + efficiency * c.efficiency_weight
            + consistency * c.consistency_weight;

        let achievements = self.earned_achievements(profile);
        let risk_bonus = ((1.0 - profile.risk_score_current) * c.risk_points).max(0.0);
        let points = c.base_points + risk_bonus + c.points_per_achievement * achievements.len() as f64;

        DriverScorecard {
            policyholder_id: profile.policyholder_id.clone(),
            overall_score: round1(overall),
            safety_score: round1(safety),
            efficiency_score: round1(efficiency),
            consistency_score: round1(consistency),
            total_points: points.max(0.0).floor() as u64,
            achievements,
        }
    }

    /// Immediate risk impact of one event; unknown kinds use the default
    pub fn event_risk_impact(&self, event_kind: &str, severity: Severity) -> f64 {
        match self.rules.event_impact.get(event_kind) {
            Some(impact) => match severity {
                Severity::Low => impact.low,
                Severity::Medium => impact.medium,
                Severity::High => impact.high,
            },
            None => self.rules.default_event_impact,
        }
    }
}

fn safety_score(c: &ScorecardConstants, profile: &PolicyholderProfile) -> f64 {
    let base = (1.0 - profile.risk_score_current) * 100.0;
    let penalty = (profile.avg_harsh_events_per_100km * c.harsh_penalty_per_event).min(c.harsh_penalty_cap);
    (base - penalty).max(0.0)
}

fn efficiency_score(c: &ScorecardConstants, profile: &PolicyholderProfile) -> f64 {
    let mut score = c.efficiency_base;
    if profile.peak_hour_driving_percentage < c.peak_bonus_below_pct {
        score += c.peak_bonus;
    }
    let (low, high) = c.mileage_band_km;
    if (low..=high).contains(&profile.total_mileage_ytd) {
        score += c.mileage_bonus;
    }
    score.min(100.0)
}

fn consistency_score(c: &ScorecardConstants, profile: &PolicyholderProfile) -> f64 {
    let (low, high) = c.daily_trips_band;
    let mut score = if (low..=high).contains(&profile.avg_daily_trips) {
        c.consistency_in_band
    } else {
        c.consistency_out_of_band
    };
    if profile.night_driving_percentage < c.night_bonus_below_pct {
        score += c.night_bonus;
    }
    score.min(100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Days among the last seven (UTC dates, today included) with no harsh events
pub fn clean_week_progress(trips: &[Trip], now: DateTime<Utc>) -> ChallengeProgress {
    let clean_days = (0..CLEAN_WEEK_DAYS)
        .filter(|offset| {
            let day = (now - Duration::days(*offset)).date_naive();
            trips
                .iter()
                .filter(|t| t.start_time.date_naive() == day)
                .all(|t| t.total_harsh_events() == 0)
        })
        .count() as f64;

    let target = CLEAN_WEEK_DAYS as f64;
    ChallengeProgress {
        current: clean_days,
        target,
        percentage: (clean_days / target * 100.0).min(100.0),
    }
}

/// Progress toward keeping night driving under the target share
pub fn night_driving_progress(profile: &PolicyholderProfile) -> ChallengeProgress {
    let current = profile.night_driving_percentage;
    let target = NIGHT_CHALLENGE_TARGET_PCT;
    let percentage = if current <= target {
        100.0
    } else {
        ((NIGHT_CHALLENGE_BASELINE_PCT - current) / (NIGHT_CHALLENGE_BASELINE_PCT - target) * 100.0)
            .clamp(0.0, 100.0)
    };
    ChallengeProgress {
        current,
        target,
        percentage,
    }
}
