//! Error types for Proctor Sentinel

use thiserror::Error;

/// Errors that can occur while monitoring a session
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Failed to parse observation trace: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An event was pushed into a session that is not accepting events.
    /// This is a caller bug, not a recoverable condition.
    #[error("Session is not active (phase: {0})")]
    SessionNotActive(String),

    #[error("Session {0} is already active")]
    SessionAlreadyActive(String),

    #[error("Perception failed: {0}")]
    Perception(String),

    #[error("Persistence delivery failed: {0}")]
    Persistence(String),
}
