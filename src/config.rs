//! Engine configuration
//!
//! Declarative rule tables for contextual risk and driver rewards, plus the
//! operational knobs of the pipeline. The billing constants (segmentation gap,
//! event thresholds, time windows, risk saturation, premium map) are module
//! constants and are not configurable here.
//!
//! A configuration is loaded from JSON (every section optional) and installed
//! once per process with [`install`]; later readers call [`global`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::{Priority, RiskFactor};
use crate::error::TelematicsError;
use crate::rewards::{Comparison, ProfileMetric};

/// Default lookback for trip processing (hours)
pub const DEFAULT_TRIP_LOOKBACK_HOURS: i64 = 24;

static GLOBAL: OnceLock<EngineConfig> = OnceLock::new();

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub context: ContextRiskTable,
    pub rewards: RewardRules,
    /// Window used when trips are processed without explicit bounds
    pub trip_lookback_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context: ContextRiskTable::default(),
            rewards: RewardRules::default(),
            trip_lookback_hours: DEFAULT_TRIP_LOOKBACK_HOURS,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, TelematicsError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TelematicsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TelematicsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Reject tables that cannot produce meaningful scores
    pub fn validate(&self) -> Result<(), TelematicsError> {
        if self.trip_lookback_hours <= 0 {
            return Err(TelematicsError::Config(format!(
                "trip_lookback_hours must be positive, got {}",
                self.trip_lookback_hours
            )));
        }

        let weights = &self.context.weights;
        for (name, weight) in [
            ("weather", weights.weather),
            ("time", weights.time),
            ("location", weights.location),
            ("traffic", weights.traffic),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(TelematicsError::Config(format!(
                    "context weight '{name}' must be within [0, 1], got {weight}"
                )));
            }
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            warn!(sum, "context factor weights do not sum to 1");
        }

        let levels = &self.context.levels;
        if levels.low_max > levels.medium_max {
            return Err(TelematicsError::Config(format!(
                "risk level cut-offs out of order: low_max {} > medium_max {}",
                levels.low_max, levels.medium_max
            )));
        }

        for (condition, risk) in &self.context.weather_risk {
            if !(0.0..=1.0).contains(risk) {
                return Err(TelematicsError::Config(format!(
                    "weather risk for '{condition}' must be within [0, 1], got {risk}"
                )));
            }
        }

        Ok(())
    }
}

/// Install the process-wide configuration. Only the first call succeeds.
pub fn install(config: EngineConfig) -> Result<&'static EngineConfig, TelematicsError> {
    config.validate()?;
    GLOBAL
        .set(config)
        .map_err(|_| TelematicsError::Config("engine configuration already installed".to_string()))?;
    global_installed()
}

fn global_installed() -> Result<&'static EngineConfig, TelematicsError> {
    GLOBAL
        .get()
        .ok_or_else(|| TelematicsError::Config("engine configuration missing after install".to_string()))
}

/// The installed configuration, or the defaults if nothing was installed
pub fn global() -> &'static EngineConfig {
    GLOBAL.get_or_init(EngineConfig::default)
}

/// Rule tables for contextual risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextRiskTable {
    /// Weather condition (lower-case) to risk in [0, 1]
    pub weather_risk: BTreeMap<String, f64>,
    /// Risk for conditions missing from the table
    pub default_weather_risk: f64,
    pub weights: FactorWeights,
    pub time: TimeRiskRules,
    pub levels: RiskLevelCutoffs,
    pub recommendations: Vec<RecommendationRule>,
}

impl Default for ContextRiskTable {
    fn default() -> Self {
        let weather_risk = [
            ("clear", 0.1),
            ("partly_cloudy", 0.2),
            ("cloudy", 0.3),
            ("light_rain", 0.6),
            ("heavy_rain", 0.8),
            ("snow", 0.9),
            ("fog", 0.7),
            ("ice", 0.95),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            weather_risk,
            default_weather_risk: 0.3,
            weights: FactorWeights::default(),
            time: TimeRiskRules::default(),
            levels: RiskLevelCutoffs::default(),
            recommendations: vec![
                RecommendationRule::new(RiskFactor::Weather, 0.5, Priority::High),
                RecommendationRule::new(RiskFactor::Time, 0.6, Priority::Medium),
                RecommendationRule::new(RiskFactor::Location, 0.5, Priority::Medium),
                RecommendationRule::new(RiskFactor::Traffic, 0.5, Priority::Low),
            ],
        }
    }
}

/// Weights of the four context factors in the overall score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub weather: f64,
    pub time: f64,
    pub location: f64,
    pub traffic: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            weather: 0.3,
            time: 0.2,
            location: 0.3,
            traffic: 0.2,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.weather + self.time + self.location + self.traffic
    }
}

/// Time-of-day and day-of-week risk increments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRiskRules {
    pub base: f64,
    /// Added in the night window
    pub night_increment: f64,
    /// Added in the peak windows (not combined with night)
    pub peak_increment: f64,
    /// Added on high-risk weekdays
    pub weekday_increment: f64,
    pub high_risk_weekdays: Vec<Weekday>,
}

impl Default for TimeRiskRules {
    fn default() -> Self {
        Self {
            base: 0.3,
            night_increment: 0.4,
            peak_increment: 0.2,
            weekday_increment: 0.2,
            high_risk_weekdays: vec![Weekday::Fri, Weekday::Sat],
        }
    }
}

/// Upper bounds (inclusive) for the low and medium levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevelCutoffs {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for RiskLevelCutoffs {
    fn default() -> Self {
        Self {
            low_max: 0.3,
            medium_max: 0.6,
        }
    }
}

/// Raise a recommendation when `factor` exceeds `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub factor: RiskFactor,
    pub threshold: f64,
    pub priority: Priority,
}

impl RecommendationRule {
    pub fn new(factor: RiskFactor, threshold: f64, priority: Priority) -> Self {
        Self {
            factor,
            threshold,
            priority,
        }
    }
}

/// Rule tables for achievements, scorecard and event impact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardRules {
    pub achievements: Vec<AchievementRule>,
    pub scorecard: ScorecardConstants,
    /// Event kind to per-severity risk impact
    pub event_impact: BTreeMap<String, SeverityImpact>,
    /// Impact for unknown event kinds or severities
    pub default_event_impact: f64,
    pub tips: Vec<TipRule>,
}

impl Default for RewardRules {
    fn default() -> Self {
        let event_impact = [
            ("harsh_braking", SeverityImpact::new(0.001, 0.003, 0.005)),
            ("rapid_acceleration", SeverityImpact::new(0.001, 0.002, 0.004)),
            ("speeding", SeverityImpact::new(0.002, 0.004, 0.008)),
            ("harsh_cornering", SeverityImpact::new(0.001, 0.002, 0.003)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            achievements: vec![
                AchievementRule::new("safe_driver", ProfileMetric::RiskScore, Comparison::AtMost, 0.3),
                AchievementRule::new(
                    "smooth_operator",
                    ProfileMetric::HarshEventsPer100km,
                    Comparison::AtMost,
                    3.0,
                ),
                AchievementRule::new(
                    "night_owl",
                    ProfileMetric::NightDrivingPct,
                    Comparison::AtMost,
                    10.0,
                ),
                AchievementRule::new(
                    "consistent_driver",
                    ProfileMetric::MonthlyTrips,
                    Comparison::AtLeast,
                    20.0,
                ),
            ],
            scorecard: ScorecardConstants::default(),
            event_impact,
            default_event_impact: 0.001,
            tips: vec![
                TipRule::new("reduce_harsh_events", ProfileMetric::HarshEventsPer100km, 5.0, Priority::High),
                TipRule::new("limit_night_driving", ProfileMetric::NightDrivingPct, 20.0, Priority::Medium),
                TipRule::new("avoid_peak_hours", ProfileMetric::PeakDrivingPct, 40.0, Priority::Medium),
            ],
        }
    }
}

/// An achievement is earned when `metric` compares true against `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRule {
    pub id: String,
    pub metric: ProfileMetric,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl AchievementRule {
    pub fn new(id: &str, metric: ProfileMetric, comparison: Comparison, threshold: f64) -> Self {
        Self {
            id: id.to_string(),
            metric,
            comparison,
            threshold,
        }
    }
}

/// A driving tip fires when `metric` is strictly above `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipRule {
    pub id: String,
    pub metric: ProfileMetric,
    pub threshold: f64,
    pub priority: Priority,
}

impl TipRule {
    pub fn new(id: &str, metric: ProfileMetric, threshold: f64, priority: Priority) -> Self {
        Self {
            id: id.to_string(),
            metric,
            threshold,
            priority,
        }
    }
}

/// Risk impact per severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityImpact {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl SeverityImpact {
    pub fn new(low: f64, medium: f64, high: f64) -> Self {
        Self { low, medium, high }
    }
}

/// Constants behind the driver scorecard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorecardConstants {
    /// Safety penalty per harsh event per 100 km
    pub harsh_penalty_per_event: f64,
    pub harsh_penalty_cap: f64,
    pub efficiency_base: f64,
    /// Peak share (percent) below which the peak bonus applies
    pub peak_bonus_below_pct: f64,
    pub peak_bonus: f64,
    /// Inclusive YTD mileage band earning the mileage bonus (km)
    pub mileage_band_km: (f64, f64),
    pub mileage_bonus: f64,
    /// Inclusive daily trip band for the higher consistency base
    pub daily_trips_band: (f64, f64),
    pub consistency_in_band: f64,
    pub consistency_out_of_band: f64,
    /// Night share (percent) below which the night bonus applies
    pub night_bonus_below_pct: f64,
    pub night_bonus: f64,
    pub safety_weight: f64,
    pub efficiency_weight: f64,
    pub consistency_weight: f64,
    pub base_points: f64,
    /// Points for a zero risk score, scaled linearly with (1 - risk)
    pub risk_points: f64,
    pub points_per_achievement: f64,
}

impl Default for ScorecardConstants {
    fn default() -> Self {
        Self {
            harsh_penalty_per_event: 5.0,
            harsh_penalty_cap: 30.0,
            efficiency_base: 70.0,
            peak_bonus_below_pct: 30.0,
            peak_bonus: 20.0,
            mileage_band_km: (5_000.0, 15_000.0),
            mileage_bonus: 10.0,
            daily_trips_band: (1.5, 3.0),
            consistency_in_band: 80.0,
            consistency_out_of_band: 60.0,
            night_bonus_below_pct: 15.0,
            night_bonus: 20.0,
            safety_weight: 0.5,
            efficiency_weight: 0.3,
            consistency_weight: 0.2,
            base_points: 1_000.0,
            risk_points: 500.0,
            points_per_achievement: 100.0,
        }
    }
}
