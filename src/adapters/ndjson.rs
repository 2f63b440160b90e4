//! NDJSON persistence gateway
//!
//! Appends one JSON record per line to any writer: a file, stdout, or a
//! buffer. Each line is tagged with `kind` so events and sessions can share
//! one stream.

use crate::error::ProctorError;
use crate::types::{CanonicalEvent, SessionSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

use super::PersistenceGateway;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Event {
        session_id: &'a str,
        event: &'a CanonicalEvent,
    },
    Session {
        #[serde(flatten)]
        snapshot: &'a SessionSnapshot,
    },
}

/// Gateway writing newline-delimited JSON records
pub struct NdjsonGateway<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> NdjsonGateway<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_record(&self, record: &Record<'_>) -> Result<(), ProctorError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| ProctorError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> PersistenceGateway for NdjsonGateway<W> {
    fn name(&self) -> &str {
        "ndjson"
    }

    async fn record_event(
        &self,
        session_id: &str,
        event: &CanonicalEvent,
    ) -> Result<(), ProctorError> {
        self.write_record(&Record::Event { session_id, event })
    }

    async fn finalize_session(&self, snapshot: &SessionSnapshot) -> Result<(), ProctorError> {
        self.write_record(&Record::Session { snapshot })
    }
}
