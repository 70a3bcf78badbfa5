//! Pipeline orchestration
//!
//! This module provides the public API for Driveline. It chains the stages
//! raw points → segments → trips → profile aggregates → risk score, either
//! as free functions over explicit inputs or through the stateful
//! [`TelematicsProcessor`] that keeps a ledger between calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregates::{AggregateOutcome, AggregateUpdater};
use crate::config::EngineConfig;
use crate::error::TelematicsError;
use crate::ledger::PolicyholderLedger;
use crate::schema::{RawPointAdapter, RawPointRecord};
use crate::scoring::{RiskAssessment, RiskScorer};
use crate::segmentation::{TripSegmenter, TripWindow};
use crate::summarizer::TripSummarizer;
use crate::types::{RawPoint, Trip};

/// Result of trip processing for one policyholder and window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "trips", rename_all = "snake_case")]
pub enum TripBatch {
    /// The window held no points
    NoData,
    /// Trips derived from the window; empty when every segment was too short
    Trips(Vec<Trip>),
}

impl TripBatch {
    pub fn trips(&self) -> &[Trip] {
        match self {
            TripBatch::NoData => &[],
            TripBatch::Trips(trips) => trips,
        }
    }

    pub fn into_trips(self) -> Vec<Trip> {
        match self {
            TripBatch::NoData => Vec::new(),
            TripBatch::Trips(trips) => trips,
        }
    }
}

/// Segment and summarize a time-ordered point stream
pub fn summarize_points(points: &[RawPoint]) -> Result<Vec<Trip>, TelematicsError> {
    let segments = TripSegmenter::segment(points)?;
    Ok(segments
        .into_iter()
        .filter_map(TripSummarizer::summarize)
        .collect())
}

/// Derive trips for one policyholder from the points inside `window`.
///
/// Points belonging to other policyholders are ignored and the remainder is
/// ordered by timestamp before segmentation.
pub fn summarize_window(
    points: &[RawPoint],
    policyholder_id: &str,
    window: &TripWindow,
) -> Result<TripBatch, TelematicsError> {
    if policyholder_id.trim().is_empty() {
        return Err(TelematicsError::MissingPolicyholder);
    }

    let mut selected: Vec<RawPoint> = points
        .iter()
        .filter(|p| p.policyholder_id == policyholder_id && window.contains(&p.timestamp))
        .cloned()
        .collect();

    if selected.is_empty() {
        debug!(policyholder_id, "no points in window");
        return Ok(TripBatch::NoData);
    }

    selected.sort_by_key(|p| p.timestamp);
    let trips = summarize_points(&selected)?;
    info!(
        policyholder_id,
        points = selected.len(),
        trips = trips.len(),
        "processed trip window"
    );
    Ok(TripBatch::Trips(trips))
}

/// Derive trips for every policyholder in a mixed batch, in parallel.
///
/// Policyholders share no state, so each group is segmented on its own
/// worker. Points outside `window` are ignored when a window is given.
pub fn summarize_fleet(
    points: &[RawPoint],
    window: Option<&TripWindow>,
) -> Result<BTreeMap<String, Vec<Trip>>, TelematicsError> {
    let mut groups: BTreeMap<String, Vec<RawPoint>> = BTreeMap::new();
    for point in points {
        if window.map_or(true, |w| w.contains(&point.timestamp)) {
            groups
                .entry(point.policyholder_id.clone())
                .or_default()
                .push(point.clone());
        }
    }

    let results: Vec<(String, Vec<Trip>)> = groups
        .into_par_iter()
        .map(|(policyholder_id, mut group)| {
            group.sort_by_key(|p| p.timestamp);
            summarize_points(&group).map(|trips| (policyholder_id, trips))
        })
        .collect::<Result<Vec<_>, TelematicsError>>()?;

    info!(
        policyholders = results.len(),
        trips = results.iter().map(|(_, t)| t.len()).sum::<usize>(),
        "processed fleet batch"
    );

    Ok(results.into_iter().collect())
}

/// Convert a raw point payload (single object or array) to trips JSON.
///
/// # Example
/// ```ignore
/// let trips_json = points_to_trips_json(payload)?;
/// ```
pub fn points_to_trips_json(payload: &str) -> Result<String, TelematicsError> {
    let records = RawPointAdapter::parse_payload(payload)?;
    let points = RawPointAdapter::ingest(records)?;
    let trips: Vec<Trip> = summarize_fleet(&points, None)?
        .into_values()
        .flatten()
        .collect();
    Ok(serde_json::to_string(&trips)?)
}

/// Stateful processor over a policyholder ledger.
///
/// Methods take `&mut self`, so updates through one processor are
/// serialized; coordinating several processors is up to the caller.
pub struct TelematicsProcessor {
    ledger: PolicyholderLedger,
    config: EngineConfig,
}

impl Default for TelematicsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelematicsProcessor {
    /// Create a processor with an empty ledger and the global configuration
    pub fn new() -> Self {
        Self::with_config(crate::config::global().clone())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            ledger: PolicyholderLedger::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PolicyholderLedger {
        &self.ledger
    }

    /// Load ledger state from JSON
    pub fn load_state(&mut self, json: &str) -> Result<(), TelematicsError> {
        self.ledger = PolicyholderLedger::from_json(json)
            .map_err(|e| TelematicsError::ParseError(e.to_string()))?;
        Ok(())
    }

    /// Save ledger state to JSON
    pub fn save_state(&self) -> Result<String, TelematicsError> {
        Ok(self.ledger.to_json()?)
    }

    /// Validate and store a batch of wire records. Nothing is stored if any
    /// record is invalid. Returns the number of stored points.
    pub fn ingest(&mut self, records: Vec<RawPointRecord>) -> Result<usize, TelematicsError> {
        let points = RawPointAdapter::ingest(records)?;
        let count = points.len();
        self.ledger.append_points(points);
        Ok(count)
    }

    /// Ingest a JSON payload holding one record or an array of records
    pub fn ingest_json(&mut self, payload: &str) -> Result<usize, TelematicsError> {
        let records = RawPointAdapter::parse_payload(payload)?;
        self.ingest(records)
    }

    /// Create an empty profile for a policyholder that has no points yet
    pub fn register_policyholder(&mut self, policyholder_id: &str) -> Result<(), TelematicsError> {
        if policyholder_id.trim().is_empty() {
            return Err(TelematicsError::MissingPolicyholder);
        }
        self.ledger.ensure_profile(policyholder_id);
        Ok(())
    }

    fn require_known(&self, policyholder_id: &str) -> Result<(), TelematicsError> {
        if policyholder_id.trim().is_empty() {
            return Err(TelematicsError::MissingPolicyholder);
        }
        if !self.ledger.contains(policyholder_id) {
            return Err(TelematicsError::UnknownPolicyholder(policyholder_id.to_string()));
        }
        Ok(())
    }

    /// Derive and store trips from the policyholder's points in `window`.
    ///
    /// Only points after the latest stored trip are considered, and the
    /// trailing group is held back until it closes at `window.end`, so each
    /// closed group becomes exactly one stored trip across repeated calls.
    /// The returned batch holds the newly stored trips.
    pub fn process_trips(
        &mut self,
        policyholder_id: &str,
        window: &TripWindow,
    ) -> Result<TripBatch, TelematicsError> {
        if policyholder_id.trim().is_empty() {
            return Err(TelematicsError::MissingPolicyholder);
        }
        let points = self.ledger.points_in_window(policyholder_id, window);
        if points.is_empty() {
            debug!(policyholder_id, "no points in window");
            return Ok(TripBatch::NoData);
        }

        let processed_until = self.ledger.last_trip_end(policyholder_id);
        let mut pending: Vec<RawPoint> = points
            .into_iter()
            .filter(|p| processed_until.map_or(true, |end| p.timestamp > end))
            .collect();
        let closed = TripSegmenter::closed_len(&pending, window.end);
        if closed < pending.len() {
            debug!(
                policyholder_id,
                open_points = pending.len() - closed,
                "holding back open trip"
            );
        }
        pending.truncate(closed);

        let trips = summarize_window(&pending, policyholder_id, window)?.into_trips();
        let added = self.ledger.append_trips(policyholder_id, trips);
        Ok(TripBatch::Trips(added))
    }

    /// Process the configured lookback window ending at `now`
    pub fn process_recent_trips(
        &mut self,
        policyholder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TripBatch, TelematicsError> {
        let window = TripWindow::lookback(now, self.config.trip_lookback_hours)?;
        self.process_trips(policyholder_id, &window)
    }

    /// Recompute the profile aggregates from the full trip history
    pub fn update_aggregates(
        &mut self,
        policyholder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AggregateOutcome, TelematicsError> {
        self.require_known(policyholder_id)?;
        let outcome = AggregateUpdater::recompute(self.ledger.trips(policyholder_id), now);
        if let AggregateOutcome::Updated(aggregates) = &outcome {
            let profile = self
                .ledger
                .ensure_profile(policyholder_id)
                .with_aggregates(aggregates);
            self.ledger.put_profile(profile);
        }
        Ok(outcome)
    }

    /// Score the policyholder, append the audit record and update the profile
    pub fn score(
        &mut self,
        policyholder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment, TelematicsError> {
        self.require_known(policyholder_id)?;
        let profile = self.ledger.ensure_profile(policyholder_id).clone();
        let assessment = RiskScorer::score(&profile, self.ledger.trips(policyholder_id), now);
        self.ledger.append_risk_record(assessment.record.clone());
        self.ledger.put_profile(assessment.profile.clone());
        Ok(assessment)
    }

    /// Remove a policyholder with all points, trips and score history
    pub fn remove_policyholder(&mut self, policyholder_id: &str) -> bool {
        self.ledger.remove_policyholder(policyholder_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NEUTRAL_RISK_SCORE;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn make_point(policyholder_id: &str, offset_secs: i64, lat: f64, ax: Option<f64>) -> RawPoint {
        RawPoint {
            device_id: format!("dev-{policyholder_id}"),
            policyholder_id: policyholder_id.to_string(),
            timestamp: base() + Duration::seconds(offset_secs),
            latitude: lat,
            longitude: -122.0,
            speed_kph: 40.0,
            acceleration_x: ax,
            acceleration_y: None,
            acceleration_z: None,
            heading_degrees: None,
            odometer_km: None,
            event_type: "normal".to_string(),
            raw_data_payload: None,
        }
    }

    fn sample_payload() -> String {
        let lines = [
            (0, 37.00, 0.0),
            (60, 37.01, 0.25),
            (120, 37.02, -0.35),
            (1000, 37.03, 0.0),
            (1060, 37.04, 0.0),
        ];
        let records: Vec<serde_json::Value> = lines
            .iter()
            .map(|(offset, lat, ax)| {
                serde_json::json!({
                    "device_id": "dev-1",
                    "policyholder_id": "PH-1",
                    "timestamp": (base() + Duration::seconds(*offset)).to_rfc3339(),
                    "latitude": lat,
                    "longitude": -122.0,
                    "speed_kph": 40.0,
                    "acceleration_x": ax,
                })
            })
            .collect();
        serde_json::Value::Array(records).to_string()
    }

    #[test]
    fn test_summarize_window_sorts_and_filters() {
        let points = vec![
            make_point("PH-1", 60, 37.01, None),
            make_point("PH-2", 0, 40.0, None),
            make_point("PH-1", 0, 37.00, None),
            make_point("PH-1", 7200, 37.05, None),
        ];
        let window = TripWindow::new(base(), base() + Duration::hours(1));
        let batch = summarize_window(&points, "PH-1", &window).unwrap();
        let trips = batch.trips();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].start_time, base());
        assert_eq!(trips[0].end_time, base() + Duration::seconds(60));
    }

    #[test]
    fn test_summarize_window_no_data() {
        let window = TripWindow::new(base(), base() + Duration::hours(1));
        assert_eq!(summarize_window(&[], "PH-1", &window).unwrap(), TripBatch::NoData);
    }

    #[test]
    fn test_summarize_window_requires_policyholder() {
        let window = TripWindow::new(base(), base() + Duration::hours(1));
        assert!(matches!(
            summarize_window(&[], "", &window),
            Err(TelematicsError::MissingPolicyholder)
        ));
    }

    #[test]
    fn test_single_points_give_empty_trip_list() {
        let points = vec![make_point("PH-1", 0, 37.0, None), make_point("PH-1", 3600, 37.0, None)];
        let window = TripWindow::new(base(), base() + Duration::hours(2));
        assert_eq!(
            summarize_window(&points, "PH-1", &window).unwrap(),
            TripBatch::Trips(Vec::new())
        );
    }

    #[test]
    fn test_fleet_groups_by_policyholder() {
        let points = vec![
            make_point("PH-2", 30, 40.0, None),
            make_point("PH-1", 0, 37.0, None),
            make_point("PH-2", 0, 40.0, None),
            make_point("PH-1", 30, 37.001, None),
            make_point("PH-3", 0, 10.0, None),
        ];
        let fleet = summarize_fleet(&points, None).unwrap();
        assert_eq!(fleet.len(), 3);
        assert_eq!(fleet["PH-1"].len(), 1);
        assert_eq!(fleet["PH-2"].len(), 1);
        assert!(fleet["PH-3"].is_empty());
    }

    #[test]
    fn test_points_to_trips_json() {
        let json = points_to_trips_json(&sample_payload()).unwrap();
        let trips: Vec<Trip> = serde_json::from_str(&json).unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].harsh_braking_count, 1);
    }

    #[test]
    fn test_processor_end_to_end() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        assert_eq!(processor.ingest_json(&sample_payload()).unwrap(), 5);

        let now = base() + Duration::hours(2);
        let batch = processor.process_recent_trips("PH-1", now).unwrap();
        assert_eq!(batch.trips().len(), 2);
        assert_eq!(processor.ledger().trips("PH-1").len(), 2);

        match processor.update_aggregates("PH-1", now).unwrap() {
            AggregateOutcome::Updated(aggregates) => {
                assert!(aggregates.total_mileage_ytd > 0.0);
                assert!(aggregates.avg_harsh_events_per_100km > 0.0);
            }
            AggregateOutcome::NoTrips => panic!("expected aggregates"),
        }

        let assessment = processor.score("PH-1", now).unwrap();
        // One braking event over a few km saturates the score
        assert_eq!(assessment.risk_score(), 1.0);
        assert_eq!(processor.ledger().risk_history("PH-1").len(), 1);
        let profile = processor.ledger().profile("PH-1").unwrap();
        assert_eq!(profile.risk_score_current, 1.0);
        assert!(profile.total_mileage_ytd > 0.0);
    }

    #[test]
    fn test_processor_invalid_batch_stores_nothing() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        let payload = r#"[
            {"device_id":"d","policyholder_id":"PH-1","timestamp":"2024-06-03T08:00:00Z","latitude":37.0,"longitude":-122.0,"speed_kph":10.0},
            {"device_id":"d","policyholder_id":"PH-1","timestamp":"2024-06-03T08:01:00Z","latitude":37.0,"longitude":-122.0}
        ]"#;
        assert!(processor.ingest_json(payload).is_err());
        assert!(processor.ledger().is_empty());
    }

    #[test]
    fn test_processor_no_trips_defaults() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        let now = base();
        processor.register_policyholder("PH-9").unwrap();
        assert_eq!(
            processor.update_aggregates("PH-9", now).unwrap(),
            AggregateOutcome::NoTrips
        );
        let assessment = processor.score("PH-9", now).unwrap();
        assert_eq!(assessment.risk_score(), NEUTRAL_RISK_SCORE);
        assert!((assessment.premium_adjustment_pct() - 5.0).abs() < 1e-9);
        assert_eq!(processor.ledger().profile("PH-9").unwrap().total_mileage_ytd, 0.0);
    }

    #[test]
    fn test_processor_state_round_trip_and_removal() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        processor.ingest_json(&sample_payload()).unwrap();
        processor.process_recent_trips("PH-1", base() + Duration::hours(2)).unwrap();
        processor.score("PH-1", base() + Duration::hours(2)).unwrap();

        let state = processor.save_state().unwrap();
        let mut restored = TelematicsProcessor::with_config(EngineConfig::default());
        restored.load_state(&state).unwrap();
        assert_eq!(restored.ledger().trips("PH-1").len(), 2);

        assert!(restored.remove_policyholder("PH-1"));
        assert!(restored.ledger().trips("PH-1").is_empty());
        assert!(restored.ledger().risk_history("PH-1").is_empty());
        assert!(!restored.remove_policyholder("PH-1"));
    }

    fn batch_payload(offsets: &[i64]) -> String {
        let records: Vec<serde_json::Value> = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                serde_json::json!({
                    "device_id": "dev-1",
                    "policyholder_id": "PH-1",
                    "timestamp": (base() + Duration::seconds(*offset)).to_rfc3339(),
                    "latitude": 37.0 + 0.01 * i as f64,
                    "longitude": -122.0,
                    "speed_kph": 40.0,
                })
            })
            .collect();
        serde_json::Value::Array(records).to_string()
    }

    #[test]
    fn test_reprocessing_stores_each_trip_once() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());

        processor.ingest_json(&batch_payload(&[0, 60, 120])).unwrap();
        let first = processor
            .process_recent_trips("PH-1", base() + Duration::hours(1))
            .unwrap();
        assert_eq!(first.trips().len(), 1);
        processor.update_aggregates("PH-1", base() + Duration::hours(1)).unwrap();
        let ytd_first = processor.ledger().profile("PH-1").unwrap().total_mileage_ytd;

        // Second batch two hours later; the 24 h window still covers the first
        processor.ingest_json(&batch_payload(&[7200, 7260])).unwrap();
        let second = processor
            .process_recent_trips("PH-1", base() + Duration::hours(3))
            .unwrap();
        assert_eq!(second.trips().len(), 1);
        assert_eq!(second.trips()[0].start_time, base() + Duration::hours(2));

        let again = processor
            .process_recent_trips("PH-1", base() + Duration::hours(3))
            .unwrap();
        assert!(again.trips().is_empty());

        let starts: Vec<DateTime<Utc>> = processor
            .ledger()
            .trips("PH-1")
            .iter()
            .map(|t| t.start_time)
            .collect();
        assert_eq!(starts, vec![base(), base() + Duration::hours(2)]);

        processor.update_aggregates("PH-1", base() + Duration::hours(3)).unwrap();
        let ytd = processor.ledger().profile("PH-1").unwrap().total_mileage_ytd;
        let second_km = processor.ledger().trips("PH-1")[1].distance_km;
        assert!((ytd - (ytd_first + second_km)).abs() < 1e-9);
    }

    #[test]
    fn test_open_trip_is_held_back_until_closed() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        processor.ingest_json(&batch_payload(&[0, 60])).unwrap();

        let early = processor
            .process_recent_trips("PH-1", base() + Duration::seconds(120))
            .unwrap();
        assert_eq!(early, TripBatch::Trips(Vec::new()));

        processor.ingest_json(&batch_payload(&[180, 240])).unwrap();
        let later = processor
            .process_recent_trips("PH-1", base() + Duration::hours(1))
            .unwrap();
        assert_eq!(later.trips().len(), 1);
        assert_eq!(later.trips()[0].end_time, base() + Duration::seconds(240));
    }

    #[test]
    fn test_unknown_policyholder_is_rejected() {
        let mut processor = TelematicsProcessor::with_config(EngineConfig::default());
        processor.ingest_json(&sample_payload()).unwrap();
        let now = base() + Duration::hours(2);

        assert!(matches!(
            processor.score("PH-typo", now),
            Err(TelematicsError::UnknownPolicyholder(id)) if id == "PH-typo"
        ));
        assert!(matches!(
            processor.update_aggregates("PH-typo", now),
            Err(TelematicsError::UnknownPolicyholder(_))
        ));
        assert!(!processor.ledger().contains("PH-typo"));
        assert!(processor.ledger().risk_history("PH-typo").is_empty());
    }

    #[test]
    fn test_lookback_overflow_is_a_config_error() {
        let config = EngineConfig {
            trip_lookback_hours: 3_000_000_000,
            ..EngineConfig::default()
        };
        let mut processor = TelematicsProcessor::with_config(config);
        assert!(matches!(
            processor.process_recent_trips("PH-1", base()),
            Err(TelematicsError::Config(_))
        ));
    }
}
