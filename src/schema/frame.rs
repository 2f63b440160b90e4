//! proctor.observation_frame.v1 schema definition
//!
//! One frame holds everything the perception layer reported for one tick.
//! Recorded sessions are stored as NDJSON, one frame per line, in tick order.

use crate::types::{RawObservation, SignalSource, FACE_LABEL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "proctor.observation_frame.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// One detection inside a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    pub source: SignalSource,
    /// Defaults to `face` for face observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_aspect_ratio: Option<f64>,
}

/// Perception output for a single tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationFrame {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub observations: Vec<FrameObservation>,
    /// Perception failed on this tick
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl ObservationFrame {
    pub fn new(timestamp: DateTime<Utc>, observations: Vec<FrameObservation>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            observations,
            failed: false,
        }
    }

    /// A tick on which perception produced nothing
    pub fn failure(timestamp: DateTime<Utc>) -> Self {
        Self {
            failed: true,
            ..Self::new(timestamp, Vec::new())
        }
    }

    /// Expand into timestamped raw observations
    pub fn to_raw(&self) -> Vec<RawObservation> {
        if self.failed {
            return Vec::new();
        }
        self.observations
            .iter()
            .map(|obs| RawObservation {
                source: obs.source,
                label: obs.label.clone().unwrap_or_else(|| match obs.source {
                    SignalSource::Face => FACE_LABEL.to_string(),
                    SignalSource::Object => String::new(),
                }),
                confidence: obs.confidence,
                timestamp: self.timestamp,
                eye_aspect_ratio: obs.eye_aspect_ratio,
            })
            .collect()
    }

    /// Validate the frame on its own
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        for obs in &self.observations {
            if !(0.0..=1.0).contains(&obs.confidence) {
                return Err(ValidationError::ConfidenceOutOfRange(obs.confidence));
            }
            if obs.source == SignalSource::Object
                && obs.label.as_deref().map(str::is_empty).unwrap_or(true)
            {
                return Err(ValidationError::MissingObjectLabel);
            }
        }

        Ok(())
    }
}

/// Validation errors for observation frames
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Object observation without a label")]
    MissingObjectLabel,

    #[error("Frame {index} at {timestamp} is earlier than the previous frame")]
    OutOfOrder { index: usize, timestamp: String },
}
