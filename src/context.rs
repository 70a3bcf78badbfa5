//! Contextual driving risk
//!
//! Combines weather, time-of-day, location and traffic into a single
//! situational risk score for a place and time. External data (weather,
//! area, traffic) comes through the [`ContextDataSource`] capability so the
//! computation can run against deterministic fixtures; the weights and
//! lookup tables come from [`ContextRiskTable`].

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ContextRiskTable;
use crate::geo::GeoPoint;
use crate::temporal::TemporalClassifier;

/// Weather condition assumed when no source or query provides one
pub const DEFAULT_WEATHER_CONDITION: &str = "clear";

/// The four context factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    Weather,
    Time,
    Location,
    Traffic,
}

impl RiskFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::Weather => "weather",
            RiskFactor::Time => "time",
            RiskFactor::Location => "location",
            RiskFactor::Traffic => "traffic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Categorical risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Current weather at a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Condition key such as "light_rain"
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_km: Option<f64>,
}

/// Crime and accident exposure of an area, already reduced to a risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaReport {
    /// Location risk in [0, 1]
    pub risk: f64,
}

/// Traffic conditions at a location for an hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficReport {
    /// Traffic risk in [0, 1]
    pub risk: f64,
}

/// Source of external context data
pub trait ContextDataSource {
    fn weather(&self, at: GeoPoint) -> WeatherReport;
    fn area(&self, at: GeoPoint) -> AreaReport;
    fn traffic(&self, at: GeoPoint, hour: u32) -> TrafficReport;
}

/// Deterministic stand-in for the external providers.
///
/// Location risk rises above 40 degrees of latitude (treated as urban);
/// traffic follows the hour of day.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicContextSource;

impl ContextDataSource for HeuristicContextSource {
    fn weather(&self, _at: GeoPoint) -> WeatherReport {
        WeatherReport {
            condition: DEFAULT_WEATHER_CONDITION.to_string(),
            temperature_c: None,
            visibility_km: None,
        }
    }

    fn area(&self, at: GeoPoint) -> AreaReport {
        let mut risk: f64 = 0.3;
        if at.latitude.abs() > 40.0 {
            risk += 0.2;
        }
        AreaReport {
            risk: risk.min(1.0),
        }
    }

    fn traffic(&self, _at: GeoPoint, hour: u32) -> TrafficReport {
        let risk = if TemporalClassifier::is_peak_hour(hour) {
            0.6
        } else if (10..=16).contains(&hour) {
            0.3
        } else {
            0.2
        };
        TrafficReport { risk }
    }
}

/// Fixed reports regardless of location or hour
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureContextSource {
    pub weather: WeatherReport,
    pub area: AreaReport,
    pub traffic: TrafficReport,
}

impl FixtureContextSource {
    pub fn new(condition: &str, area_risk: f64, traffic_risk: f64) -> Self {
        Self {
            weather: WeatherReport {
                condition: condition.to_string(),
                temperature_c: None,
                visibility_km: None,
            },
            area: AreaReport { risk: area_risk },
            traffic: TrafficReport { risk: traffic_risk },
        }
    }
}

impl ContextDataSource for FixtureContextSource {
    fn weather(&self, _at: GeoPoint) -> WeatherReport {
        self.weather.clone()
    }

    fn area(&self, _at: GeoPoint) -> AreaReport {
        self.area.clone()
    }

    fn traffic(&self, _at: GeoPoint, _hour: u32) -> TrafficReport {
        self.traffic.clone()
    }
}

/// Where and when to assess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub location: GeoPoint,
    /// Hour of day (0-23)
    pub hour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<Weekday>,
    /// Weather condition supplied by the caller; overrides the data source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_condition: Option<String>,
}

/// Individual factor scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub weather: f64,
    pub time: f64,
    pub location: f64,
    pub traffic: f64,
}

impl RiskFactors {
    pub fn get(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::Weather => self.weather,
            RiskFactor::Time => self.time,
            RiskFactor::Location => self.location,
            RiskFactor::Traffic => self.traffic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RiskFactor,
    pub priority: Priority,
}

/// Contextual risk for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualRisk {
    pub location: GeoPoint,
    /// Weighted score, rounded to three decimals
    pub contextual_risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: RiskFactors,
    pub recommendations: Vec<Recommendation>,
}

/// Contextual risk calculator over a rule table
pub struct ContextualRiskEngine<'a> {
    table: &'a ContextRiskTable,
}

impl<'a> ContextualRiskEngine<'a> {
    pub fn new(table: &'a ContextRiskTable) -> Self {
        Self { table }
    }

    /// Weather risk for a condition, case-insensitive
    pub fn weather_risk(&self, condition: &str) -> f64 {
        let key = condition.trim().to_lowercase();
        match self.table.weather_risk.get(&key) {
            Some(risk) => *risk,
            None => {
                warn!(condition = %condition, "unknown weather condition, using default risk");
                self.table.default_weather_risk
            }
        }
    }

    /// Time risk for an hour and optional weekday, capped at 1
    pub fn time_risk(&self, hour: u32, weekday: Option<Weekday>) -> f64 {
        let rules = &self.table.time;
        let mut risk = rules.base;
        if TemporalClassifier::is_night_hour(hour) {
            risk += rules.night_increment;
        } else if TemporalClassifier::is_peak_hour(hour) {
            risk += rules.peak_increment;
        }
        if weekday.is_some_and(|day| rules.high_risk_weekdays.contains(&day)) {
            risk += rules.weekday_increment;
        }
        risk.min(1.0)
    }

    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if score <= self.table.levels.low_max {
            RiskLevel::Low
        } else if score <= self.table.levels.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn recommendations(&self, factors: &RiskFactors) -> Vec<Recommendation> {
        self.table
            .recommendations
            .iter()
            .filter(|rule| factors.get(rule.factor) > rule.threshold)
            .map(|rule| Recommendation {
                category: rule.factor,
                priority: rule.priority,
            })
            .collect()
    }

    /// Assess a query against a data source
    pub fn assess(&self, source: &dyn ContextDataSource, query: &ContextQuery) -> ContextualRisk {
        let condition = match &query.weather_condition {
            Some(condition) => condition.clone(),
            None => source.weather(query.location).condition,
        };

        let factors = RiskFactors {
            weather: self.weather_risk(&condition),
            time: self.time_risk(query.hour, query.weekday),
            location: source.area(query.location).risk.clamp(0.0, 1.0),
            traffic: source.traffic(query.location, query.hour).risk.clamp(0.0, 1.0),
        };

        let weights = &self.table.weights;
        let score = factors.weather * weights.weather
            + factors.time * weights.time
            + factors.location * weights.location
            + factors.traffic * weights.traffic;

        debug!(
            condition = %condition,
            hour = query.hour,
            score,
            "assessed contextual risk"
        );

        ContextualRisk {
            location: query.location,
            contextual_risk_score: (score * 1000.0).round() / 1000.0,
            risk_level: self.risk_level(score),
            risk_factors: factors,
            recommendations: self.recommendations(&factors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query(lat: f64, hour: u32, weekday: Option<Weekday>) -> ContextQuery {
        ContextQuery {
            location: GeoPoint::new(lat, -73.9),
            hour,
            weekday,
            weather_condition: None,
        }
    }

    #[test]
    fn test_weather_lookup_is_case_insensitive_with_default() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);
        assert_eq!(engine.weather_risk("Heavy_Rain"), 0.8);
        assert_eq!(engine.weather_risk("ice"), 0.95);
        assert_eq!(engine.weather_risk("volcanic_ash"), 0.3);
    }

    #[test]
    fn test_time_risk() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);
        assert!((engine.time_risk(12, None) - 0.3).abs() < 1e-9);
        assert!((engine.time_risk(8, None) - 0.5).abs() < 1e-9);
        assert!((engine.time_risk(23, None) - 0.7).abs() < 1e-9);
        assert!((engine.time_risk(23, Some(Weekday::Fri)) - 0.9).abs() < 1e-9);
        assert!((engine.time_risk(12, Some(Weekday::Mon)) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_time_risk_is_capped() {
        let mut table = ContextRiskTable::default();
        table.time.night_increment = 0.9;
        let engine = ContextualRiskEngine::new(&table);
        assert_eq!(engine.time_risk(2, Some(Weekday::Sat)), 1.0);
    }

    #[test]
    fn test_heuristic_source() {
        let source = HeuristicContextSource;
        assert!((source.area(GeoPoint::new(40.7, -74.0)).risk - 0.5).abs() < 1e-9);
        assert!((source.area(GeoPoint::new(34.0, -118.0)).risk - 0.3).abs() < 1e-9);
        assert_eq!(source.traffic(GeoPoint::new(0.0, 0.0), 18).risk, 0.6);
        assert_eq!(source.traffic(GeoPoint::new(0.0, 0.0), 13).risk, 0.3);
        assert_eq!(source.traffic(GeoPoint::new(0.0, 0.0), 2).risk, 0.2);
    }

    #[test]
    fn test_assess_with_fixture() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);
        let source = FixtureContextSource::new("heavy_rain", 0.6, 0.6);

        // Friday 23:00: time = 0.3 + 0.4 + 0.2
        let risk = engine.assess(&source, &query(41.0, 23, Some(Weekday::Fri)));

        assert_eq!(
            risk.risk_factors,
            RiskFactors {
                weather: 0.8,
                time: risk.risk_factors.time,
                location: 0.6,
                traffic: 0.6,
            }
        );
        assert!((risk.risk_factors.time - 0.9).abs() < 1e-9);
        // 0.8*0.3 + 0.9*0.2 + 0.6*0.3 + 0.6*0.2 = 0.72
        assert!((risk.contextual_risk_score - 0.72).abs() < 1e-9);
        assert_eq!(risk.risk_level, RiskLevel::High);

        let categories: Vec<RiskFactor> = risk.recommendations.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![RiskFactor::Weather, RiskFactor::Time, RiskFactor::Location, RiskFactor::Traffic]
        );
        assert_eq!(risk.recommendations[0].priority, Priority::High);
    }

    #[test]
    fn test_assess_calm_conditions() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);

        // Heuristic source, clear weather, Monday noon below 40 degrees
        let risk = engine.assess(&HeuristicContextSource, &query(35.0, 12, Some(Weekday::Mon)));
        // 0.1*0.3 + 0.3*0.2 + 0.3*0.3 + 0.3*0.2 = 0.24
        assert!((risk.contextual_risk_score - 0.24).abs() < 1e-9);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert!(risk.recommendations.is_empty());
    }

    #[test]
    fn test_query_weather_overrides_source() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);
        let mut q = query(35.0, 12, None);
        q.weather_condition = Some("FOG".to_string());
        let risk = engine.assess(&HeuristicContextSource, &q);
        assert_eq!(risk.risk_factors.weather, 0.7);
    }

    #[test]
    fn test_risk_level_boundaries() {
        let table = ContextRiskTable::default();
        let engine = ContextualRiskEngine::new(&table);
        assert_eq!(engine.risk_level(0.3), RiskLevel::Low);
        assert_eq!(engine.risk_level(0.31), RiskLevel::Medium);
        assert_eq!(engine.risk_level(0.6), RiskLevel::Medium);
        assert_eq!(engine.risk_level(0.61), RiskLevel::High);
    }
}
