//! Driveline - Trip derivation and usage-based risk scoring for vehicle telematics
//!
//! Driveline turns raw device samples into trips and trips into a policyholder
//! risk profile through a deterministic pipeline: ingestion → segmentation →
//! trip summarization → aggregate recomputation → risk scoring → premium
//! adjustment.
//!
//! ## Modules
//!
//! - **Trip Pipeline**: geo, events, temporal, segmentation, summarizer
//! - **Profile Pipeline**: aggregates, scoring
//! - **Context & Rewards**: contextual driving risk and driver rewards over
//!   configurable rule tables

pub mod aggregates;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod geo;
pub mod ledger;
pub mod pipeline;
pub mod rewards;
pub mod schema;
pub mod scoring;
pub mod segmentation;
pub mod summarizer;
pub mod temporal;
pub mod types;

pub use aggregates::{AggregateOutcome, AggregateUpdater};
pub use config::EngineConfig;
pub use context::{ContextDataSource, ContextualRiskEngine, HeuristicContextSource};
pub use error::TelematicsError;
pub use geo::{distance_km, GeoPoint, RouteGeometry};
pub use ledger::PolicyholderLedger;
pub use pipeline::{
    points_to_trips_json, summarize_fleet, summarize_window, TelematicsProcessor, TripBatch,
};
pub use rewards::RewardsEngine;
pub use scoring::{premium_adjustment, RiskAssessment, RiskScorer};
pub use segmentation::{TripSegmenter, TripWindow};
pub use summarizer::TripSummarizer;
pub use types::{PolicyholderProfile, RawPoint, RiskScoreRecord, Trip};

// Schema exports
pub use schema::{RawPointAdapter, RawPointRecord, SCHEMA_VERSION};

/// Driveline version reported by the CLI
pub const DRIVELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on CLI reports
pub const PRODUCER_NAME: &str = "driveline";
