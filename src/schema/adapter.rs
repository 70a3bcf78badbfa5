//! Adapter for parsing and ingesting telematics.raw_point.v1 records
//!
//! Handles the accepted payload shapes (single object, JSON array, NDJSON)
//! and converts wire records into validated [`RawPoint`]s. Ingestion is
//! all-or-nothing: one bad record rejects the whole batch.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TelematicsError;
use crate::schema::raw_point::{RawPointRecord, ValidationError};
use crate::types::RawPoint;

/// Adapter for converting wire records to raw points
pub struct RawPointAdapter;

impl RawPointAdapter {
    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<RawPointRecord>, TelematicsError> {
        let records: Vec<RawPointRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON), one record per line
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawPointRecord>, TelematicsError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawPointRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(TelematicsError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse a payload holding either a single record or an array of records
    pub fn parse_payload(json: &str) -> Result<Vec<RawPointRecord>, TelematicsError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
            other => Err(TelematicsError::ParseError(format!(
                "Expected a JSON object or array, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Validate and convert a batch. Fails on the first invalid record and
    /// returns nothing in that case.
    pub fn ingest(records: Vec<RawPointRecord>) -> Result<Vec<RawPoint>, TelematicsError> {
        let count = records.len();
        let points = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| record.into_point(index))
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(|e| {
                warn!(error = %e, "rejected raw point batch");
                TelematicsError::from(e)
            })?;
        debug!(records = count, "ingested raw point batch");
        Ok(points)
    }

    /// Validate a batch without failing fast; returns only the failures
    pub fn validate_records(records: &[RawPointRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.validate(index).err().map(|error| ValidationResult {
                    index,
                    device_id: record.device_id.clone(),
                    error: error.to_string(),
                })
            })
            .collect()
    }
}

/// Validation failure for a single record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub error: String,
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
