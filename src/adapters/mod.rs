//! External collaborator seams
//!
//! The perception models and the durable store live outside the core. This
//! module defines the narrow interfaces the monitor drives them through, plus
//! a few in-process implementations.

mod memory;
mod ndjson;
mod scripted;

pub use memory::MemoryGateway;
pub use ndjson::NdjsonGateway;
pub use scripted::ScriptedPerception;

use crate::error::ProctorError;
use crate::types::{CanonicalEvent, RawObservation, SessionSnapshot};
use async_trait::async_trait;

/// Source of per-tick observations (face and object classifiers)
#[async_trait]
pub trait PerceptionAdapter: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &str;

    /// Observations for the current tick.
    ///
    /// An error means "no observation this tick"; the monitor treats it as an
    /// empty tick and keeps going.
    async fn observe(&self) -> Result<Vec<RawObservation>, ProctorError>;
}

/// Durable store for events and finished sessions
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Gateway name for logs
    fn name(&self) -> &str;

    /// Store one event as soon as it is emitted
    async fn record_event(
        &self,
        session_id: &str,
        event: &CanonicalEvent,
    ) -> Result<(), ProctorError>;

    /// Store the final snapshot of an ended session
    async fn finalize_session(&self, snapshot: &SessionSnapshot) -> Result<(), ProctorError>;
}
