//! Parsing recorded observation traces

use crate::error::ProctorError;
use crate::schema::frame::{ObservationFrame, ValidationError};

/// Reader for recorded traces
pub struct TraceReader;

impl TraceReader {
    /// Parse a JSON array of frames
    pub fn parse_array(json: &str) -> Result<Vec<ObservationFrame>, ProctorError> {
        let frames: Vec<ObservationFrame> = serde_json::from_str(json)?;
        Ok(frames)
    }

    /// Parse NDJSON, one frame per line; blank lines are skipped
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ObservationFrame>, ProctorError> {
        let mut frames = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ObservationFrame>(trimmed) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    return Err(ProctorError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(frames)
    }

    /// Validate every frame and check that timestamps never go backwards
    pub fn validate(frames: &[ObservationFrame]) -> Result<(), ValidationError> {
        for (index, frame) in frames.iter().enumerate() {
            frame.validate()?;
            if index > 0 && frame.timestamp < frames[index - 1].timestamp {
                return Err(ValidationError::OutOfOrder {
                    index,
                    timestamp: frame.timestamp.to_rfc3339(),
                });
            }
        }
        Ok(())
    }
}
