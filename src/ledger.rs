//! In-memory policyholder ledger
//!
//! Holds everything persisted per policyholder: the profile, raw points, the
//! append-only trip history and the append-only risk score history. Removing
//! a policyholder removes all of it. The whole ledger serializes to JSON so
//! state can be carried between runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TelematicsError;
use crate::segmentation::TripWindow;
use crate::types::{PolicyholderProfile, RawPoint, RiskScoreRecord, Trip};

/// Everything stored for one policyholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyholderRecord {
    pub profile: PolicyholderProfile,
    #[serde(default)]
    pub raw_points: Vec<RawPoint>,
    #[serde(default)]
    pub trips: Vec<Trip>,
    #[serde(default)]
    pub risk_history: Vec<RiskScoreRecord>,
}

impl PolicyholderRecord {
    fn new(policyholder_id: &str) -> Self {
        Self {
            profile: PolicyholderProfile::new(policyholder_id),
            raw_points: Vec::new(),
            trips: Vec::new(),
            risk_history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyholderLedger {
    policyholders: BTreeMap<String, PolicyholderRecord>,
}

impl PolicyholderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TelematicsError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), TelematicsError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn policyholder_ids(&self) -> impl Iterator<Item = &str> {
        self.policyholders.keys().map(String::as_str)
    }

    pub fn contains(&self, policyholder_id: &str) -> bool {
        self.policyholders.contains_key(policyholder_id)
    }

    pub fn len(&self) -> usize {
        self.policyholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policyholders.is_empty()
    }

    fn entry(&mut self, policyholder_id: &str) -> &mut PolicyholderRecord {
        self.policyholders
            .entry(policyholder_id.to_string())
            .or_insert_with(|| PolicyholderRecord::new(policyholder_id))
    }

    /// Profile for a policyholder, creating a fresh one if unknown
    pub fn ensure_profile(&mut self, policyholder_id: &str) -> &PolicyholderProfile {
        &self.entry(policyholder_id).profile
    }

    pub fn profile(&self, policyholder_id: &str) -> Option<&PolicyholderProfile> {
        self.policyholders.get(policyholder_id).map(|r| &r.profile)
    }

    /// Replace the stored profile with an updated record
    pub fn put_profile(&mut self, profile: PolicyholderProfile) {
        let id = profile.policyholder_id.clone();
        self.entry(&id).profile = profile;
    }

    /// Store raw points under their own policyholder ids
    pub fn append_points(&mut self, points: Vec<RawPoint>) {
        for point in points {
            let id = point.policyholder_id.clone();
            self.entry(&id).raw_points.push(point);
        }
    }

    /// Points inside `window`, ordered by timestamp
    pub fn points_in_window(&self, policyholder_id: &str, window: &TripWindow) -> Vec<RawPoint> {
        let mut points: Vec<RawPoint> = self
            .policyholders
            .get(policyholder_id)
            .map(|r| {
                r.raw_points
                    .iter()
                    .filter(|p| window.contains(&p.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        points.sort_by_key(|p| p.timestamp);
        points
    }

    /// Append trips not already stored for the same time span.
    ///
    /// Returns the trips that were actually added.
    pub fn append_trips(&mut self, policyholder_id: &str, trips: Vec<Trip>) -> Vec<Trip> {
        let stored = &mut self.entry(policyholder_id).trips;
        let mut added = Vec::with_capacity(trips.len());
        for trip in trips {
            let duplicate = stored
                .iter()
                .any(|t| t.start_time == trip.start_time && t.end_time == trip.end_time);
            if duplicate {
                debug!(policyholder_id, start = %trip.start_time, "skipping stored trip");
                continue;
            }
            stored.push(trip.clone());
            added.push(trip);
        }
        added
    }

    /// End of the latest stored trip; points up to it are already summarized
    pub fn last_trip_end(&self, policyholder_id: &str) -> Option<DateTime<Utc>> {
        self.trips(policyholder_id).iter().map(|t| t.end_time).max()
    }

    pub fn trips(&self, policyholder_id: &str) -> &[Trip] {
        self.policyholders
            .get(policyholder_id)
            .map(|r| r.trips.as_slice())
            .unwrap_or(&[])
    }

    pub fn append_risk_record(&mut self, record: RiskScoreRecord) {
        let id = record.policyholder_id.clone();
        self.entry(&id).risk_history.push(record);
    }

    pub fn risk_history(&self, policyholder_id: &str) -> &[RiskScoreRecord] {
        self.policyholders
            .get(policyholder_id)
            .map(|r| r.risk_history.as_slice())
            .unwrap_or(&[])
    }

    /// Remove a policyholder together with its points, trips and history
    pub fn remove_policyholder(&mut self, policyholder_id: &str) -> Option<PolicyholderRecord> {
        let removed = self.policyholders.remove(policyholder_id);
        if let Some(record) = &removed {
            info!(
                policyholder_id,
                points = record.raw_points.len(),
                trips = record.trips.len(),
                scores = record.risk_history.len(),
                "removed policyholder"
            );
        }
        removed
    }
}
