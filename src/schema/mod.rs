//! telematics.raw_point.v1 ingestion schema
//!
//! This module defines the device-facing input record, its validation rules
//! and the parsers for the accepted payload shapes.

mod raw_point;
mod adapter;

pub use raw_point::*;
pub use adapter::*;
