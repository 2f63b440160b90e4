//! Live session monitor
//!
//! Drives the [`ProctorPipeline`] from a fixed-period timer. Each tick polls
//! the perception adapter, runs the pipeline, raises one alert per emitted
//! event and hands each event to the persistence gateway without waiting for
//! it.
//!
//! At most one tick is in flight at a time. When the timer fires while the
//! previous tick is still running (usually a slow perception call), the new
//! tick is skipped rather than queued. Session start and end wait for any
//! in-flight tick before touching session state.

use crate::adapters::{PerceptionAdapter, PersistenceGateway};
use crate::alerts::AlertScheduler;
use crate::config::{AlertConfig, MonitorConfig};
use crate::error::ProctorError;
use crate::face::FaceState;
use crate::pipeline::ProctorPipeline;
use crate::session::{SessionPhase, SessionState};
use crate::types::{Alert, AlertId, CanonicalEvent, SessionSnapshot, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Wall-clock time derived from the runtime's monotonic clock
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Consistent copy of the monitor's live state
#[derive(Debug, Clone, Serialize)]
pub struct MonitorView {
    pub phase: SessionPhase,
    pub session: Option<SessionState>,
    pub face_state: Option<FaceState>,
    pub alerts: Vec<Alert>,
    pub polling: bool,
    pub skipped_ticks: u64,
    pub delivery_failures: u64,
    /// Most recent persistence failure in this session, kept after session end
    pub persistence_error: Option<String>,
}

struct Poller {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Shared {
    pipeline: parking_lot::Mutex<ProctorPipeline>,
    /// Held for the whole of a tick, and by session start/end
    tick_gate: Arc<AsyncMutex<()>>,
    perception: Arc<dyn PerceptionAdapter>,
    persistence: Arc<dyn PersistenceGateway>,
    alerts: AlertScheduler,
    alert_config: AlertConfig,
    deliveries: parking_lot::Mutex<JoinSet<()>>,
    skipped_ticks: AtomicU64,
    delivery_failures: Arc<AtomicU64>,
    persistence_error: Arc<parking_lot::Mutex<Option<String>>>,
    clock: Clock,
}

impl Shared {
    async fn run_tick(&self, _gate: OwnedMutexGuard<()>) {
        let observations = match self.perception.observe().await {
            Ok(observations) => observations,
            Err(e) => {
                tracing::warn!(
                    adapter = self.perception.name(),
                    error = %e,
                    "Perception failed, treating tick as empty"
                );
                Vec::new()
            }
        };

        let now = self.clock.now();
        let (session_id, events) = {
            let mut pipeline = self.pipeline.lock();
            let session_id = match pipeline.state() {
                Some(state) if pipeline.is_active() => state.session_id.clone(),
                _ => return,
            };
            match pipeline.process_tick(&observations, now) {
                Ok(events) => (session_id, events),
                Err(e) => {
                    tracing::error!(error = %e, "Tick failed");
                    return;
                }
            }
        };

        for event in events {
            let (severity, ttl_ms) = self.alert_config.for_event(event.event_type);
            self.alerts.push(severity, event.details.clone(), ttl_ms);
            self.deliver(session_id.clone(), event);
        }
    }

    fn deliver(&self, session_id: String, event: CanonicalEvent) {
        let persistence = Arc::clone(&self.persistence);
        let alerts = self.alerts.clone();
        let failures = Arc::clone(&self.delivery_failures);
        let last_error = Arc::clone(&self.persistence_error);
        let ttl_ms = self.alert_config.delivery_failure_ttl_ms;

        let mut deliveries = self.deliveries.lock();
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn(async move {
            if let Err(e) = persistence.record_event(&session_id, &event).await {
                failures.fetch_add(1, Ordering::Relaxed);
                *last_error.lock() = Some(e.to_string());
                tracing::warn!(
                    gateway = persistence.name(),
                    session_id = %session_id,
                    event_id = event.id,
                    error = %e,
                    "Event delivery failed"
                );
                alerts.push(
                    Severity::Warning,
                    format!("Failed to save {} event", event.event_type),
                    ttl_ms,
                );
            }
        });
    }

    async fn drain_deliveries(&self) {
        let mut deliveries = std::mem::take(&mut *self.deliveries.lock());
        while let Some(result) = deliveries.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Event delivery task aborted");
            }
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        match Arc::clone(&shared.tick_gate).try_lock_owned() {
            Ok(gate) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.run_tick(gate).await });
            }
            Err(_) => {
                let skipped = shared.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(skipped, "Previous tick still running, skipping");
            }
        }
    }
}

/// Async driver for one proctoring session at a time
pub struct Monitor {
    shared: Arc<Shared>,
    tick_period: Duration,
    poller: parking_lot::Mutex<Option<Poller>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        perception: Arc<dyn PerceptionAdapter>,
        persistence: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, ProctorError> {
        let tick_period = config.tick_period();
        let alert_config = config.alerts.clone();
        let pipeline = ProctorPipeline::new(config)?;

        Ok(Self {
            shared: Arc::new(Shared {
                pipeline: parking_lot::Mutex::new(pipeline),
                tick_gate: Arc::new(AsyncMutex::new(())),
                perception,
                persistence,
                alerts: AlertScheduler::new(),
                alert_config,
                deliveries: parking_lot::Mutex::new(JoinSet::new()),
                skipped_ticks: AtomicU64::new(0),
                delivery_failures: Arc::new(AtomicU64::new(0)),
                persistence_error: Arc::new(parking_lot::Mutex::new(None)),
                clock: Clock::start(),
            }),
            tick_period,
            poller: parking_lot::Mutex::new(None),
        })
    }

    /// Start a new session and begin polling
    pub async fn start_session(&self, candidate_name: &str) -> Result<SessionState, ProctorError> {
        let _gate = self.shared.tick_gate.lock().await;
        let state = {
            let mut pipeline = self.shared.pipeline.lock();
            pipeline
                .start_session(candidate_name, self.shared.clock.now())?
                .clone()
        };
        self.shared.alerts.clear();
        *self.shared.persistence_error.lock() = None;
        self.spawn_poller();
        Ok(state)
    }

    /// Stop polling, wait for outstanding work and hand the final snapshot
    /// to the persistence gateway.
    ///
    /// A failed final delivery does not fail the call: the snapshot is still
    /// returned, and the error stays readable through
    /// [`Monitor::persistence_error`] and [`MonitorView`] after alerts are
    /// cleared.
    pub async fn end_session(&self) -> Result<SessionSnapshot, ProctorError> {
        self.stop_poller().await;
        let _gate = self.shared.tick_gate.lock().await;

        let snapshot = self
            .shared
            .pipeline
            .lock()
            .end_session(self.shared.clock.now())?;

        self.shared.drain_deliveries().await;
        self.shared.alerts.clear();

        if let Err(e) = self.shared.persistence.finalize_session(&snapshot).await {
            self.shared.delivery_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                gateway = self.shared.persistence.name(),
                session_id = %snapshot.session_id,
                error = %e,
                "Session delivery failed"
            );
            *self.shared.persistence_error.lock() = Some(e.to_string());
        }
        Ok(snapshot)
    }

    /// Stop polling without touching session state
    pub async fn pause(&self) -> Result<(), ProctorError> {
        self.require_active()?;
        self.stop_poller().await;
        tracing::info!("Monitoring paused");
        Ok(())
    }

    /// Restart polling after [`Monitor::pause`]
    pub fn resume(&self) -> Result<(), ProctorError> {
        self.require_active()?;
        self.spawn_poller();
        tracing::info!("Monitoring resumed");
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    pub fn view(&self) -> MonitorView {
        let (phase, session, face_state) = {
            let pipeline = self.shared.pipeline.lock();
            (
                pipeline.phase(),
                pipeline.state().cloned(),
                pipeline.last_face_state(),
            )
        };
        MonitorView {
            phase,
            session,
            face_state,
            alerts: self.shared.alerts.current(),
            polling: self.is_polling(),
            skipped_ticks: self.skipped_ticks(),
            delivery_failures: self.shared.delivery_failures.load(Ordering::Relaxed),
            persistence_error: self.persistence_error(),
        }
    }

    /// Last failed event or session delivery since the session started
    pub fn persistence_error(&self) -> Option<String> {
        self.shared.persistence_error.lock().clone()
    }

    /// Remove an alert before it expires; unknown ids are ignored
    pub fn dismiss_alert(&self, id: AlertId) -> Option<Alert> {
        self.shared.alerts.remove(id)
    }

    pub fn subscribe_alerts(&self) -> watch::Receiver<Vec<Alert>> {
        self.shared.alerts.subscribe()
    }

    /// Ticks dropped because the previous one was still running
    pub fn skipped_ticks(&self) -> u64 {
        self.shared.skipped_ticks.load(Ordering::Relaxed)
    }

    fn require_active(&self) -> Result<(), ProctorError> {
        let pipeline = self.shared.pipeline.lock();
        if pipeline.is_active() {
            Ok(())
        } else {
            Err(ProctorError::SessionNotActive(pipeline.phase().to_string()))
        }
    }

    fn spawn_poller(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(Arc::clone(&self.shared), self.tick_period, rx));
        *poller = Some(Poller { shutdown, handle });
    }

    async fn stop_poller(&self) {
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            let _ = poller.shutdown.send(true);
            if let Err(e) = poller.handle.await {
                tracing::warn!(error = %e, "Poll loop ended abnormally");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.handle.abort();
        }
        self.shared.alerts.clear();
    }
}
