//! Driveline CLI - Command-line interface for the telematics pipeline
//!
//! Commands:
//! - trips: Derive trips from raw points
//! - aggregate: Recompute profile aggregates from trips
//! - score: Risk score and premium adjustment from trips
//! - run: Full pipeline with persistent ledger state
//! - validate: Validate raw point input
//! - context: Contextual driving risk for a place and time
//! - doctor: Diagnose configuration and environment
//! - schema: Print input/output schemas

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc, Weekday};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use driveline::config::{self, EngineConfig};
use driveline::context::{ContextQuery, ContextualRisk, ContextualRiskEngine, HeuristicContextSource};
use driveline::rewards::{
    clean_week_progress, night_driving_progress, ChallengeProgress, DriverScorecard, DrivingTip,
    RewardsEngine,
};
use driveline::types::{PolicyholderProfile, ProfileAggregates, RiskScoreRecord};
use driveline::{
    summarize_fleet, AggregateOutcome, AggregateUpdater, GeoPoint, PolicyholderLedger,
    RawPointAdapter, RawPointRecord, RiskScorer, TelematicsError, TelematicsProcessor, Trip,
    TripBatch, TripWindow, DRIVELINE_VERSION, PRODUCER_NAME, SCHEMA_VERSION,
};

/// Driveline - Trip derivation and usage-based risk scoring
#[derive(Parser)]
#[command(name = "driveline")]
#[command(version = DRIVELINE_VERSION)]
#[command(about = "Turn vehicle telematics into trips, profiles and risk scores", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive trips from raw points
    Trips {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Only use points at or after this time (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Only use points at or before this time (RFC 3339)
        #[arg(long)]
        until: Option<String>,
    },

    /// Recompute profile aggregates from trips
    Aggregate {
        /// Trips file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Reference time (RFC 3339, default now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Score policyholders from their trips
    Score {
        /// Trips file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Reference time (RFC 3339, default now)
        #[arg(long)]
        now: Option<String>,

        /// Include achievements, scorecard, tips and challenges
        #[arg(long)]
        rewards: bool,
    },

    /// Run the full pipeline over raw points with persistent state
    Run {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Reference time (RFC 3339, default now)
        #[arg(long)]
        now: Option<String>,

        /// Trip window length in hours (default from configuration)
        #[arg(long)]
        lookback_hours: Option<i64>,

        /// Load ledger state from file
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save ledger state to file after processing
        #[arg(long)]
        save_state: Option<PathBuf>,
    },

    /// Validate raw point input
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Contextual driving risk for a place and time
    Context {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Hour of day (0-23)
        #[arg(long)]
        hour: u32,

        /// Day of week (e.g. "fri")
        #[arg(long)]
        weekday: Option<String>,

        /// Weather condition (e.g. "light_rain")
        #[arg(long)]
        weather: Option<String>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a ledger state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema type to print
        #[arg(value_enum, default_value = "input")]
        schema_type: SchemaType,

        /// Output as JSON Schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array
    Json,
    /// Pretty-printed JSON array
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaType {
    /// Raw point input schema
    Input,
    /// Trip output schema
    Output,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            let message = serde_json::to_string(&error)
                .unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", error.code));
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), DrivelineCliError> {
    // doctor reports on the file instead of installing it
    let is_doctor = matches!(cli.command, Commands::Doctor { .. });
    if let (Some(path), false) = (&cli.config, is_doctor) {
        let loaded = EngineConfig::load_from_file(path)?;
        config::install(loaded)?;
        info!(path = %path.display(), "installed engine configuration");
    }

    match cli.command {
        Commands::Trips {
            input,
            output,
            input_format,
            output_format,
            since,
            until,
        } => cmd_trips(
            &input,
            &output,
            input_format,
            output_format,
            since.as_deref(),
            until.as_deref(),
        ),
        Commands::Aggregate {
            input,
            input_format,
            output_format,
            now,
        } => cmd_aggregate(&input, input_format, output_format, now.as_deref()),
        Commands::Score {
            input,
            input_format,
            output_format,
            now,
            rewards,
        } => cmd_score(&input, input_format, output_format, now.as_deref(), rewards),
        Commands::Run {
            input,
            input_format,
            output_format,
            now,
            lookback_hours,
            load_state,
            save_state,
        } => cmd_run(
            &input,
            input_format,
            output_format,
            now.as_deref(),
            lookback_hours,
            load_state.as_deref(),
            save_state.as_deref(),
        ),
        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),
        Commands::Context {
            lat,
            lon,
            hour,
            weekday,
            weather,
        } => cmd_context(lat, lon, hour, weekday.as_deref(), weather),
        Commands::Doctor { state, json } => cmd_doctor(cli.config.as_deref(), state.as_deref(), json),
        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_trips(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<(), DrivelineCliError> {
    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(DrivelineCliError::NoPoints);
    }
    let points = RawPointAdapter::ingest(records)?;

    let window = match (since, until) {
        (None, None) => None,
        (start, end) => Some(TripWindow::new(
            start.map(parse_time).transpose()?.unwrap_or(DateTime::<Utc>::MIN_UTC),
            end.map(parse_time).transpose()?.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )),
    };

    let trips: Vec<Trip> = summarize_fleet(&points, window.as_ref())?
        .into_values()
        .flatten()
        .collect();

    write_output(output, &format_output(&trips, output_format)?)
}

fn cmd_aggregate(
    input: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    now: Option<&str>,
) -> Result<(), DrivelineCliError> {
    let now = reference_time(now)?;
    let trips = read_trips(input, input_format)?;

    let reports: Vec<AggregateReport> = group_trips(trips)
        .into_iter()
        .map(|(policyholder_id, trips)| {
            let aggregates = match AggregateUpdater::recompute(&trips, now) {
                AggregateOutcome::NoTrips => None,
                AggregateOutcome::Updated(aggregates) => Some(aggregates),
            };
            AggregateReport {
                policyholder_id,
                trips: trips.len(),
                aggregates,
            }
        })
        .collect();

    print!("{}", format_output(&reports, output_format)?);
    Ok(())
}

fn cmd_score(
    input: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    now: Option<&str>,
    rewards: bool,
) -> Result<(), DrivelineCliError> {
    let now = reference_time(now)?;
    let trips = read_trips(input, input_format)?;
    let engine_config = config::global();
    let engine = RewardsEngine::new(&engine_config.rewards);

    let reports: Vec<ScoreReport> = group_trips(trips)
        .into_iter()
        .map(|(policyholder_id, trips)| {
            let mut profile = PolicyholderProfile::new(policyholder_id);
            if let AggregateOutcome::Updated(aggregates) = AggregateUpdater::recompute(&trips, now) {
                profile = profile.with_aggregates(&aggregates);
            }
            let assessment = RiskScorer::score(&profile, &trips, now);
            let rewards = rewards.then(|| RewardsReport::build(&engine, &assessment.profile, &trips, now));
            ScoreReport {
                record: assessment.record,
                rewards,
            }
        })
        .collect();

    print!("{}", format_output(&reports, output_format)?);
    Ok(())
}

fn cmd_run(
    input: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    now: Option<&str>,
    lookback_hours: Option<i64>,
    load_state: Option<&Path>,
    save_state: Option<&Path>,
) -> Result<(), DrivelineCliError> {
    let now = reference_time(now)?;
    let mut processor = TelematicsProcessor::new();

    if let Some(path) = load_state {
        processor.load_state(&fs::read_to_string(path)?)?;
    }

    let records = read_records(input, input_format)?;
    let policyholders: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.policyholder_id.clone())
        .collect();
    let stored = processor.ingest(records)?;
    info!(points = stored, policyholders = policyholders.len(), "ingested raw points");

    let hours = lookback_hours.unwrap_or(processor.config().trip_lookback_hours);
    if hours <= 0 {
        return Err(DrivelineCliError::Engine(TelematicsError::Config(format!(
            "lookback hours must be positive, got {}",
            hours
        ))));
    }
    let window = TripWindow::lookback(now, hours)?;

    let mut reports = Vec::with_capacity(policyholders.len());
    for policyholder_id in &policyholders {
        let new_trips = match processor.process_trips(policyholder_id, &window)? {
            TripBatch::NoData => 0,
            TripBatch::Trips(trips) => trips.len(),
        };
        processor.update_aggregates(policyholder_id, now)?;
        let assessment = processor.score(policyholder_id, now)?;
        reports.push(RunReport {
            policyholder_id: policyholder_id.clone(),
            new_trips,
            total_trips: processor.ledger().trips(policyholder_id).len(),
            profile: assessment.profile,
            risk_score: assessment.record,
        });
    }

    if let Some(path) = save_state {
        fs::write(path, processor.save_state()?)?;
    }

    print!("{}", format_output(&reports, output_format)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), DrivelineCliError> {
    let records = read_records(input, input_format)?;
    let results = RawPointAdapter::validate_records(&records);

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Device {} (index {}): {}",
                    err.device_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(DrivelineCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_context(
    lat: f64,
    lon: f64,
    hour: u32,
    weekday: Option<&str>,
    weather: Option<String>,
) -> Result<(), DrivelineCliError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(DrivelineCliError::InvalidArgument(format!(
            "location out of range: ({}, {})",
            lat, lon
        )));
    }
    if hour > 23 {
        return Err(DrivelineCliError::InvalidArgument(format!(
            "hour must be in 0-23, got {}",
            hour
        )));
    }
    let weekday = weekday
        .map(|w| {
            w.parse::<Weekday>()
                .map_err(|_| DrivelineCliError::InvalidArgument(format!("unknown weekday: {}", w)))
        })
        .transpose()?;

    let query = ContextQuery {
        location: GeoPoint::new(lat, lon),
        hour,
        weekday,
        weather_condition: weather,
    };
    let engine = ContextualRiskEngine::new(&config::global().context);
    let risk: ContextualRisk = engine.assess(&HeuristicContextSource, &query);

    println!("{}", serde_json::to_string_pretty(&risk)?);
    Ok(())
}

fn cmd_doctor(
    config_path: Option<&Path>,
    state: Option<&Path>,
    json: bool,
) -> Result<(), DrivelineCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "driveline_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Driveline version {}", DRIVELINE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    let active = match config_path {
        Some(path) => match EngineConfig::load_from_file(path) {
            Ok(loaded) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Configuration valid ({})", path.display()),
                });
                Some(loaded)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid configuration: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Using built-in configuration".to_string(),
            });
            Some(EngineConfig::default())
        }
    };

    if let Some(active) = &active {
        checks.push(weights_check(active));
    }

    if let Some(state_path) = state {
        checks.push(state_check(state_path));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for piped input)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: DRIVELINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Driveline Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DrivelineCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn weights_check(config: &EngineConfig) -> DoctorCheck {
    let weight_sum = config.context.weights.sum();
    if (weight_sum - 1.0).abs() > 1e-6 {
        DoctorCheck {
            name: "context_weights".to_string(),
            status: CheckStatus::Warning,
            message: format!("Context factor weights sum to {:.3}, not 1", weight_sum),
        }
    } else {
        DoctorCheck {
            name: "context_weights".to_string(),
            status: CheckStatus::Ok,
            message: "Context factor weights sum to 1".to_string(),
        }
    }
}

fn state_check(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Warning,
            message: "State file does not exist".to_string(),
        };
    }
    match PolicyholderLedger::load_from_file(path) {
        Ok(ledger) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Ok,
            message: format!("State file valid ({} policyholders)", ledger.len()),
        },
        Err(e) => DoctorCheck {
            name: "state".to_string(),
            status: CheckStatus::Error,
            message: format!("Invalid state file: {}", e),
        },
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), DrivelineCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per device sample:");
                println!();
                println!("Required:");
                println!("  - device_id, policyholder_id (string or integer)");
                println!("  - timestamp (ISO-8601 with Z or offset)");
                println!("  - latitude [-90, 90], longitude [-180, 180]");
                println!("  - speed_kph (>= 0)");
                println!();
                println!("Optional:");
                println!("  - acceleration_x, acceleration_y, acceleration_z (g)");
                println!("  - heading_degrees [0, 359], odometer_km");
                println!("  - event_type (default \"normal\"), raw_data_payload (opaque)");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", output_json_schema());
            } else {
                println!("Output Schema: trip");
                println!();
                println!("- id, policyholder_id");
                println!("- start_time, end_time, duration_seconds");
                println!("- distance_km, avg_speed_kph, max_speed_kph");
                println!("- harsh_braking_count, rapid_acceleration_count, harsh_cornering_count");
                println!("- night_driving_minutes, peak_hour_driving_minutes");
                println!("- route_geometry: GeoJSON LineString of [longitude, latitude]");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, DrivelineCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), DrivelineCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn read_records(input: &Path, format: InputFormat) -> Result<Vec<RawPointRecord>, DrivelineCliError> {
    let data = read_input(input)?;
    let records = match format {
        InputFormat::Ndjson => RawPointAdapter::parse_ndjson(&data)?,
        InputFormat::Json => RawPointAdapter::parse_array(&data)?,
    };
    Ok(records)
}

fn read_trips(input: &Path, format: InputFormat) -> Result<Vec<Trip>, DrivelineCliError> {
    let data = read_input(input)?;
    match format {
        InputFormat::Json => Ok(serde_json::from_str(&data)?),
        InputFormat::Ndjson => {
            let mut trips = Vec::new();
            for (line_num, line) in data.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let trip: Trip = serde_json::from_str(trimmed).map_err(|e| {
                    DrivelineCliError::ParseError(format!("line {}: {}", line_num + 1, e))
                })?;
                trips.push(trip);
            }
            Ok(trips)
        }
    }
}

fn group_trips(trips: Vec<Trip>) -> BTreeMap<String, Vec<Trip>> {
    let mut groups: BTreeMap<String, Vec<Trip>> = BTreeMap::new();
    for trip in trips {
        groups.entry(trip.policyholder_id.clone()).or_default().push(trip);
    }
    groups
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, DrivelineCliError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DrivelineCliError::InvalidArgument(format!("invalid time '{}': {}", value, e)))
}

fn reference_time(now: Option<&str>) -> Result<DateTime<Utc>, DrivelineCliError> {
    now.map(parse_time).transpose().map(|t| t.unwrap_or_else(Utc::now))
}

fn format_output<T: Serialize>(items: &[T], format: OutputFormat) -> Result<String, DrivelineCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            if lines.is_empty() {
                Ok(String::new())
            } else {
                Ok(lines.join("\n") + "\n")
            }
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)?),
    }
}

fn input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Driveline raw telematics point",
        "type": "object",
        "required": ["device_id", "policyholder_id", "timestamp", "latitude", "longitude", "speed_kph"],
        "properties": {
            "device_id": { "type": ["string", "integer"] },
            "policyholder_id": { "type": ["string", "integer"] },
            "timestamp": { "type": "string", "format": "date-time" },
            "latitude": { "type": "number", "minimum": -90, "maximum": 90 },
            "longitude": { "type": "number", "minimum": -180, "maximum": 180 },
            "speed_kph": { "type": "number", "minimum": 0 },
            "acceleration_x": { "type": "number" },
            "acceleration_y": { "type": "number" },
            "acceleration_z": { "type": "number" },
            "heading_degrees": { "type": "integer", "minimum": 0, "maximum": 359 },
            "odometer_km": { "type": "number" },
            "event_type": { "type": "string", "default": "normal" },
            "raw_data_payload": {}
        }
    })
    .to_string()
}

fn output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "trip",
        "description": "Driveline derived trip",
        "type": "object",
        "required": [
            "id", "policyholder_id", "start_time", "end_time", "duration_seconds",
            "distance_km", "avg_speed_kph", "max_speed_kph", "harsh_braking_count",
            "rapid_acceleration_count", "harsh_cornering_count", "night_driving_minutes",
            "peak_hour_driving_minutes", "route_geometry"
        ],
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "policyholder_id": { "type": "string" },
            "start_time": { "type": "string", "format": "date-time" },
            "end_time": { "type": "string", "format": "date-time" },
            "duration_seconds": { "type": "integer", "minimum": 0 },
            "distance_km": { "type": "number", "minimum": 0 },
            "avg_speed_kph": { "type": "number", "minimum": 0 },
            "max_speed_kph": { "type": "integer", "minimum": 0 },
            "harsh_braking_count": { "type": "integer", "minimum": 0 },
            "rapid_acceleration_count": { "type": "integer", "minimum": 0 },
            "harsh_cornering_count": { "type": "integer", "minimum": 0 },
            "night_driving_minutes": { "type": "integer", "minimum": 0 },
            "peak_hour_driving_minutes": { "type": "integer", "minimum": 0 },
            "route_geometry": {
                "type": "object",
                "required": ["type", "coordinates"],
                "properties": {
                    "type": { "const": "LineString" },
                    "coordinates": {
                        "type": "array",
                        "items": {
                            "type": "array",
                            "items": { "type": "number" },
                            "minItems": 2,
                            "maxItems": 2
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum DrivelineCliError {
    Io(io::Error),
    Engine(TelematicsError),
    Json(serde_json::Error),
    NoPoints,
    ValidationFailed(usize),
    DoctorFailed,
    InvalidArgument(String),
    ParseError(String),
}

impl From<io::Error> for DrivelineCliError {
    fn from(e: io::Error) -> Self {
        DrivelineCliError::Io(e)
    }
}

impl From<TelematicsError> for DrivelineCliError {
    fn from(e: TelematicsError) -> Self {
        DrivelineCliError::Engine(e)
    }
}

impl From<serde_json::Error> for DrivelineCliError {
    fn from(e: serde_json::Error) -> Self {
        DrivelineCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DrivelineCliError> for CliError {
    fn from(e: DrivelineCliError) -> Self {
        match e {
            DrivelineCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DrivelineCliError::Engine(e) => engine_error(e),
            DrivelineCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DrivelineCliError::NoPoints => CliError {
                code: "NO_POINTS".to_string(),
                message: "No raw points found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DrivelineCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            DrivelineCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            DrivelineCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Run with --help for usage".to_string()),
            },
            DrivelineCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

fn engine_error(e: TelematicsError) -> CliError {
    let (code, hint) = match &e {
        TelematicsError::ParseError(_) | TelematicsError::JsonError(_) => (
            "PARSE_ERROR",
            format!("Ensure input matches {} schema", SCHEMA_VERSION),
        ),
        TelematicsError::Validation(_) => (
            "VALIDATION_ERROR",
            "Run 'driveline validate' for details".to_string(),
        ),
        TelematicsError::MissingPolicyholder => (
            "MISSING_POLICYHOLDER",
            "Every record needs a policyholder_id".to_string(),
        ),
        TelematicsError::UnknownPolicyholder(_) => (
            "UNKNOWN_POLICYHOLDER",
            "Ingest points for the policyholder or load a state file that has it".to_string(),
        ),
        TelematicsError::OutOfOrder { .. } => (
            "OUT_OF_ORDER",
            "Sort points by timestamp before segmenting".to_string(),
        ),
        TelematicsError::Config(_) => (
            "CONFIG_ERROR",
            "Run 'driveline doctor --config <file>' to check the configuration".to_string(),
        ),
        TelematicsError::Io(_) => ("IO_ERROR", "Check file paths and permissions".to_string()),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint),
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<driveline::schema::ValidationResult>,
}

#[derive(serde::Serialize)]
struct AggregateReport {
    policyholder_id: String,
    trips: usize,
    /// None when the policyholder has no trips
    aggregates: Option<ProfileAggregates>,
}

#[derive(serde::Serialize)]
struct ScoreReport {
    record: RiskScoreRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    rewards: Option<RewardsReport>,
}

#[derive(serde::Serialize)]
struct RewardsReport {
    scorecard: DriverScorecard,
    tips: Vec<DrivingTip>,
    clean_week: ChallengeProgress,
    night_driving: ChallengeProgress,
}

impl RewardsReport {
    fn build(
        engine: &RewardsEngine<'_>,
        profile: &PolicyholderProfile,
        trips: &[Trip],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            scorecard: engine.scorecard(profile),
            tips: engine.tips(profile),
            clean_week: clean_week_progress(trips, now),
            night_driving: night_driving_progress(profile),
        }
    }
}

#[derive(serde::Serialize)]
struct RunReport {
    policyholder_id: String,
    new_trips: usize,
    total_trips: usize,
    profile: PolicyholderProfile,
    risk_score: RiskScoreRecord,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
