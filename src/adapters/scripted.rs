//! Scripted perception adapter
//!
//! Plays back a queue of prepared tick results. Useful for demos, replays
//! driven through the async monitor, and tests.

use crate::error::ProctorError;
use crate::types::RawObservation;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::PerceptionAdapter;

/// Perception adapter returning queued results in order
pub struct ScriptedPerception {
    ticks: Mutex<VecDeque<Result<Vec<RawObservation>, String>>>,
    /// Returned once the script is exhausted
    fallback: Mutex<Vec<RawObservation>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for ScriptedPerception {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPerception {
    pub fn new() -> Self {
        Self {
            ticks: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Vec::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate a slow model: every `observe` call takes `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one successful tick
    pub fn push(&self, observations: Vec<RawObservation>) {
        self.ticks.lock().push_back(Ok(observations));
    }

    /// Queue one failed tick
    pub fn push_failure(&self, message: impl Into<String>) {
        self.ticks.lock().push_back(Err(message.into()));
    }

    /// Observations returned on every call after the queue runs dry
    pub fn set_fallback(&self, observations: Vec<RawObservation>) {
        *self.fallback.lock() = observations;
    }

    /// Number of `observe` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.ticks.lock().len()
    }
}

#[async_trait]
impl PerceptionAdapter for ScriptedPerception {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn observe(&self) -> Result<Vec<RawObservation>, ProctorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.ticks.lock().pop_front();
        match next {
            Some(Ok(observations)) => Ok(observations),
            Some(Err(message)) => Err(ProctorError::Perception(message)),
            None => Ok(self.fallback.lock().clone()),
        }
    }
}
