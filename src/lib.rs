//! Proctor Sentinel - integrity monitoring core for proctored sessions
//!
//! Sentinel turns noisy per-tick perception output (faces and objects seen by
//! a camera) into a small number of de-duplicated integrity events, keeps an
//! append-only event log with a running integrity score, and raises
//! short-lived alerts for a live UI: stability filtering → event
//! classification → session aggregation → alert dispatch.
//!
//! ## Modules
//!
//! - **Pipeline**: synchronous per-tick processing, usable offline on recorded traces
//! - **Monitor**: async tick driver around the pipeline with alerts and persistence

pub mod adapters;
pub mod alerts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod face;
pub mod monitor;
pub mod objects;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod session;
pub mod stability;
pub mod types;

pub use adapters::{PerceptionAdapter, PersistenceGateway};
pub use config::MonitorConfig;
pub use error::ProctorError;
pub use monitor::{Monitor, MonitorView};
pub use pipeline::{replay_trace, ProctorPipeline};
pub use report::SessionSummary;

// Schema exports
pub use schema::{ObservationFrame, TraceReader, SCHEMA_VERSION};

/// Sentinel version
pub const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "proctor-sentinel";
