//! Sentinel CLI - Command-line interface for Proctor Sentinel
//!
//! Commands:
//! - replay: Run a recorded observation trace through the pipeline (offline)
//! - simulate: Play a recorded trace through the live monitor in real time
//! - audit: Check a session snapshot against its own event log
//! - config: Print or check monitor configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use proctor_sentinel::adapters::{NdjsonGateway, ScriptedPerception};
use proctor_sentinel::schema::{ObservationFrame, TraceReader, ValidationError};
use proctor_sentinel::session::replay_events;
use proctor_sentinel::types::{IntegrityRating, SessionSnapshot};
use proctor_sentinel::{
    replay_trace, Monitor, MonitorConfig, PerceptionAdapter, PersistenceGateway, ProctorError,
    SessionSummary, PRODUCER_NAME, SENTINEL_VERSION,
};

/// Sentinel - integrity monitoring for proctored sessions
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(version = SENTINEL_VERSION)]
#[command(about = "Stabilize proctoring signals into scored integrity events", long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded observation trace (offline, frame timestamps as clock)
    Replay {
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
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Monitor configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Candidate name recorded in the session
        #[arg(long, default_value = "unknown")]
        candidate: String,
    },

    /// Play a recorded trace through the live monitor, one frame per tick
    Simulate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Monitor configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Candidate name recorded in the session
        #[arg(long, default_value = "unknown")]
        candidate: String,
    },

    /// Verify that a snapshot's score and counters match its event log
    Audit {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output audit report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration, or check a configuration file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Session snapshot as compact JSON
    Json,
    /// Session snapshot as pretty-printed JSON
    JsonPretty,
    /// One event per line
    Events,
    /// Human-readable summary
    Summary,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), SentinelCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            candidate,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            &candidate,
        ),

        Commands::Simulate {
            input,
            config,
            candidate,
        } => cmd_simulate(&input, config.as_deref(), &candidate),

        Commands::Audit { input, json } => cmd_audit(&input, json),

        Commands::Config { check } => cmd_config(check.as_deref()),
    }
}

fn read_input(input: &Path) -> Result<String, SentinelCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            tracing::warn!("Reading from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig, SentinelCliError> {
    match path {
        Some(path) => Ok(MonitorConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(MonitorConfig::default()),
    }
}

fn load_frames(
    input: &Path,
    input_format: InputFormat,
) -> Result<Vec<ObservationFrame>, SentinelCliError> {
    let data = read_input(input)?;
    let frames = match input_format {
        InputFormat::Ndjson => TraceReader::parse_ndjson(&data)?,
        InputFormat::Json => TraceReader::parse_array(&data)?,
    };
    if frames.is_empty() {
        return Err(SentinelCliError::NoFrames);
    }
    TraceReader::validate(&frames)?;
    Ok(frames)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    candidate: &str,
) -> Result<(), SentinelCliError> {
    let config = load_config(config)?;
    let frames = load_frames(input, input_format)?;
    tracing::info!(frames = frames.len(), "Replaying trace");

    let snapshot = replay_trace(&frames, config, candidate)?;
    let output_data = format_output(&snapshot, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_simulate(
    input: &Path,
    config: Option<&Path>,
    candidate: &str,
) -> Result<(), SentinelCliError> {
    let config = load_config(config)?;
    let frames = load_frames(input, InputFormat::Ndjson)?;

    let perception = Arc::new(ScriptedPerception::new());
    for frame in &frames {
        if frame.failed {
            perception.push_failure("recorded perception failure");
        } else {
            perception.push(frame.to_raw());
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let tick_period = config.tick_period();
    let ticks = frames.len() as u32;
    runtime.block_on(async move {
        let perception: Arc<dyn PerceptionAdapter> = perception;
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(NdjsonGateway::new(io::stdout()));
        let monitor = Monitor::new(config, perception, gateway)?;

        let state = monitor.start_session(candidate).await?;
        tracing::info!(session_id = %state.session_id, ticks, "Simulating session");

        // One tick per frame, plus half a period for the last tick to finish.
        tokio::time::sleep(tick_period * ticks + tick_period / 2).await;

        let view = monitor.view();
        let snapshot = monitor.end_session().await?;
        tracing::info!(
            score = snapshot.integrity_score,
            rating = snapshot.rating.as_str(),
            skipped_ticks = view.skipped_ticks,
            delivery_failures = view.delivery_failures,
            "Simulation finished"
        );
        if let Some(error) = monitor.persistence_error() {
            tracing::warn!(error = %error, "Session was not fully saved");
        }
        Ok::<(), SentinelCliError>(())
    })
}

fn cmd_audit(input: &Path, json: bool) -> Result<(), SentinelCliError> {
    let data = read_input(input)?;
    let snapshot: SessionSnapshot = serde_json::from_str(&data)?;

    let rebuilt = replay_events(
        &snapshot.session_id,
        &snapshot.candidate_name,
        snapshot.started_at,
        &snapshot.events,
    );

    let mut mismatches = Vec::new();
    let mut compare = |field: &str, stored: String, replayed: String| {
        if stored != replayed {
            mismatches.push(AuditMismatch {
                field: field.to_string(),
                stored,
                replayed,
            });
        }
    };
    compare(
        "integrity_score",
        snapshot.integrity_score.to_string(),
        rebuilt.integrity_score.to_string(),
    );
    compare(
        "focus_lost_count",
        snapshot.focus_lost_count.to_string(),
        rebuilt.focus_lost_count.to_string(),
    );
    compare(
        "suspicious_event_count",
        snapshot.suspicious_event_count.to_string(),
        rebuilt.suspicious_event_count.to_string(),
    );
    compare(
        "detection_stats",
        serde_json::to_string(&snapshot.detection_stats)?,
        serde_json::to_string(&rebuilt.detection_stats)?,
    );
    compare(
        "rating",
        snapshot.rating.as_str().to_string(),
        IntegrityRating::from_score(snapshot.integrity_score)
            .as_str()
            .to_string(),
    );

    let report = AuditReport {
        producer: PRODUCER_NAME.to_string(),
        version: SENTINEL_VERSION.to_string(),
        session_id: snapshot.session_id.clone(),
        events: snapshot.events.len(),
        summary: SessionSummary::from_snapshot(&snapshot),
        mismatches,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Audit Report");
        println!("============");
        print!("{}", report.summary.to_text());
        if report.mismatches.is_empty() {
            println!("\n[OK] Event log reproduces the stored score and counters");
        } else {
            println!("\nMismatches:");
            for m in &report.mismatches {
                println!("  [ERR] {}: stored {}, replayed {}", m.field, m.stored, m.replayed);
            }
        }
    }

    if report.mismatches.is_empty() {
        Ok(())
    } else {
        Err(SentinelCliError::AuditFailed(report.mismatches.len()))
    }
}

fn cmd_config(check: Option<&Path>) -> Result<(), SentinelCliError> {
    match check {
        Some(path) => {
            let config = MonitorConfig::from_json(&fs::read_to_string(path)?)?;
            println!(
                "[OK] {}: tick period {} ms",
                path.display(),
                config.tick_period_ms
            );
        }
        None => println!("{}", MonitorConfig::default().to_json()?),
    }
    Ok(())
}

fn format_output(
    snapshot: &SessionSnapshot,
    format: &OutputFormat,
) -> Result<String, SentinelCliError> {
    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(snapshot)?)),
        OutputFormat::JsonPretty => Ok(format!("{}\n", serde_json::to_string_pretty(snapshot)?)),
        OutputFormat::Events => {
            let mut output = String::new();
            for event in &snapshot.events {
                output.push_str(&serde_json::to_string(event)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Summary => Ok(SessionSummary::from_snapshot(snapshot).to_text()),
    }
}

// Error types

#[derive(Debug)]
enum SentinelCliError {
    Io(io::Error),
    Sentinel(ProctorError),
    Json(serde_json::Error),
    Validation(ValidationError),
    NoFrames,
    AuditFailed(usize),
}

impl From<io::Error> for SentinelCliError {
    fn from(e: io::Error) -> Self {
        SentinelCliError::Io(e)
    }
}

impl From<ProctorError> for SentinelCliError {
    fn from(e: ProctorError) -> Self {
        SentinelCliError::Sentinel(e)
    }
}

impl From<serde_json::Error> for SentinelCliError {
    fn from(e: serde_json::Error) -> Self {
        SentinelCliError::Json(e)
    }
}

impl From<ValidationError> for SentinelCliError {
    fn from(e: ValidationError) -> Self {
        SentinelCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SentinelCliError> for CliError {
    fn from(e: SentinelCliError) -> Self {
        match e {
            SentinelCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SentinelCliError::Sentinel(e) => {
                let hint = match &e {
                    ProctorError::InvalidConfig(_) => "Run 'sentinel config' to see the defaults",
                    ProctorError::ParseError(_) | ProctorError::JsonError(_) => {
                        "Ensure input matches proctor.observation_frame.v1"
                    }
                    _ => "Re-run with --verbose for details",
                };
                CliError {
                    code: "SENTINEL_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            SentinelCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SentinelCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Frames must be ordered by timestamp with confidences in [0, 1]".to_string()),
            },
            SentinelCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            SentinelCliError::AuditFailed(count) => CliError {
                code: "AUDIT_FAILED".to_string(),
                message: format!("{} fields do not match the event log", count),
                hint: Some("The snapshot was modified or produced by a different scoring table".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct AuditReport {
    producer: String,
    version: String,
    session_id: String,
    events: usize,
    summary: SessionSummary,
    mismatches: Vec<AuditMismatch>,
}

#[derive(serde::Serialize)]
struct AuditMismatch {
    field: String,
    stored: String,
    replayed: String,
}
