//! telematics.raw_point.v1 wire record
//!
//! The shape a device (or the HTTP layer in front of it) submits for each
//! sample. Every field is optional on the wire so that a missing required
//! field is reported by name and record index instead of as a generic
//! deserialization failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::RawPoint;

/// Current schema version
pub const SCHEMA_VERSION: &str = "telematics.raw_point.v1";

/// Event label used when the device does not send one
pub const DEFAULT_EVENT_TYPE: &str = "normal";

/// Raw point as received at the ingestion boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPointRecord {
    /// Device identifier (string or integer on the wire)
    #[serde(default, deserialize_with = "identifier")]
    pub device_id: Option<String>,
    /// Policyholder identifier (string or integer on the wire)
    #[serde(default, deserialize_with = "identifier")]
    pub policyholder_id: Option<String>,
    /// ISO-8601 timestamp with `Z` or a numeric offset
    pub timestamp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Instantaneous speed (km/h)
    pub speed_kph: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_degrees: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Opaque device payload, kept as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data_payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Number(i64),
}

fn identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Identifier>::deserialize(deserializer)?.map(|id| match id {
        Identifier::Text(text) => text,
        Identifier::Number(number) => number.to_string(),
    }))
}

impl RawPointRecord {
    /// Check required fields and value ranges
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        self.checked(index).map(|_| ())
    }

    /// Validate and convert into a [`RawPoint`]
    pub fn into_point(self, index: usize) -> Result<RawPoint, ValidationError> {
        let checked = self.checked(index)?;
        Ok(RawPoint {
            device_id: checked.device_id,
            policyholder_id: checked.policyholder_id,
            timestamp: checked.timestamp,
            latitude: checked.latitude,
            longitude: checked.longitude,
            speed_kph: checked.speed_kph,
            acceleration_x: self.acceleration_x,
            acceleration_y: self.acceleration_y,
            acceleration_z: self.acceleration_z,
            heading_degrees: checked.heading_degrees,
            odometer_km: self.odometer_km,
            event_type: self
                .event_type
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            raw_data_payload: self.raw_data_payload,
        })
    }

    fn checked(&self, index: usize) -> Result<CheckedFields, ValidationError> {
        let device_id = required_identifier(index, "device_id", self.device_id.as_deref())?;
        let policyholder_id =
            required_identifier(index, "policyholder_id", self.policyholder_id.as_deref())?;

        let raw_timestamp = self
            .timestamp
            .as_deref()
            .ok_or(ValidationError::MissingField {
                index,
                field: "timestamp",
            })?;
        let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| {
            ValidationError::InvalidTimestamp {
                index,
                value: raw_timestamp.to_string(),
            }
        })?;

        let latitude = required_number(index, "latitude", self.latitude)?;
        check_range(index, "latitude", latitude, -90.0, 90.0)?;
        let longitude = required_number(index, "longitude", self.longitude)?;
        check_range(index, "longitude", longitude, -180.0, 180.0)?;
        let speed_kph = required_number(index, "speed_kph", self.speed_kph)?;
        check_range(index, "speed_kph", speed_kph, 0.0, f64::MAX)?;

        for (field, value) in [
            ("acceleration_x", self.acceleration_x),
            ("acceleration_y", self.acceleration_y),
            ("acceleration_z", self.acceleration_z),
        ] {
            if let Some(v) = value {
                check_range(index, field, v, f64::MIN, f64::MAX)?;
            }
        }

        let heading_degrees = match self.heading_degrees {
            Some(h) if (0..=359).contains(&h) => Some(h as u16),
            Some(h) => {
                return Err(ValidationError::OutOfRange {
                    index,
                    field: "heading_degrees",
                    value: h as f64,
                })
            }
            None => None,
        };

        Ok(CheckedFields {
            device_id,
            policyholder_id,
            timestamp,
            latitude,
            longitude,
            speed_kph,
            heading_degrees,
        })
    }
}

struct CheckedFields {
    device_id: String,
    policyholder_id: String,
    timestamp: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    speed_kph: f64,
    heading_degrees: Option<u16>,
}

/// Parse an ISO-8601 timestamp with `Z` or a numeric offset into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn required_identifier(
    index: usize,
    field: &'static str,
    value: Option<&str>,
) -> Result<String, ValidationError> {
    match value {
        None => Err(ValidationError::MissingField { index, field }),
        Some(v) if v.trim().is_empty() => Err(ValidationError::EmptyIdentifier { index, field }),
        Some(v) => Ok(v.to_string()),
    }
}

fn required_number(
    index: usize,
    field: &'static str,
    value: Option<f64>,
) -> Result<f64, ValidationError> {
    value.ok_or(ValidationError::MissingField { index, field })
}

fn check_range(
    index: usize,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            index,
            field,
            value,
        })
    }
}

/// Validation errors for raw point records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Record {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Record {index}: '{field}' must not be empty")]
    EmptyIdentifier { index: usize, field: &'static str },

    #[error("Record {index}: invalid timestamp '{value}' (expected ISO-8601 with Z or offset)")]
    InvalidTimestamp { index: usize, value: String },

    #[error("Record {index}: '{field}' out of range: {value}")]
    OutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
    },
}

impl ValidationError {
    /// Index of the offending record in its batch
    pub fn index(&self) -> usize {
        match self {
            ValidationError::MissingField { index, .. }
            | ValidationError::EmptyIdentifier { index, .. }
            | ValidationError::InvalidTimestamp { index, .. }
            | ValidationError::OutOfRange { index, .. } => *index,
        }
    }
}
