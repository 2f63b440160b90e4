//! In-memory persistence gateway

use crate::error::ProctorError;
use crate::types::{CanonicalEvent, SessionSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::PersistenceGateway;

/// Gateway that keeps every delivered payload in memory.
///
/// It can be switched into a failing mode to exercise the delivery-failure
/// path.
#[derive(Default)]
pub struct MemoryGateway {
    events: Mutex<Vec<(String, CanonicalEvent)>>,
    sessions: Mutex<Vec<SessionSnapshot>>,
    failing: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, CanonicalEvent)> {
        self.events.lock().clone()
    }

    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.sessions.lock().clone()
    }

    fn check(&self) -> Result<(), ProctorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ProctorError::Persistence("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record_event(
        &self,
        session_id: &str,
        event: &CanonicalEvent,
    ) -> Result<(), ProctorError> {
        self.check()?;
        self.events
            .lock()
            .push((session_id.to_string(), event.clone()));
        Ok(())
    }

    async fn finalize_session(&self, snapshot: &SessionSnapshot) -> Result<(), ProctorError> {
        self.check()?;
        self.sessions.lock().push(snapshot.clone());
        Ok(())
    }
}
