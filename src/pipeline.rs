//! Pipeline orchestration
//!
//! This module wires the per-tick stages together:
//! 1. FaceTracker / ObjectTracker - classify observations and apply stability
//! 2. EventClassifier - map qualifying labels to canonical events
//! 3. SessionAggregator - append events and update the score
//!
//! The pipeline is synchronous and clock-agnostic: every call takes `now`, so
//! the same code drives both the live monitor and offline trace replay.

use crate::classifier::EventClassifier;
use crate::config::MonitorConfig;
use crate::error::ProctorError;
use crate::face::{FaceState, FaceTracker};
use crate::objects::ObjectTracker;
use crate::schema::ObservationFrame;
use crate::session::{SessionAggregator, SessionPhase, SessionState};
use crate::types::{CanonicalEvent, RawObservation, SessionSnapshot, SignalSource, FACE_LABEL};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Replay a recorded trace through a fresh pipeline.
///
/// Frame timestamps are the clock: the session starts at the first frame and
/// ends at the last one.
///
/// # Example
/// ```ignore
/// let frames = TraceReader::parse_ndjson(&trace)?;
/// let snapshot = replay_trace(&frames, MonitorConfig::default(), "Ada Lovelace")?;
/// ```
pub fn replay_trace(
    frames: &[ObservationFrame],
    config: MonitorConfig,
    candidate_name: &str,
) -> Result<SessionSnapshot, ProctorError> {
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => {
            return Err(ProctorError::ParseError(
                "trace contains no frames".to_string(),
            ))
        }
    };

    let mut pipeline = ProctorPipeline::new(config)?;
    pipeline.start_session(candidate_name, first)?;
    for frame in frames {
        pipeline.process_frame(frame)?;
    }
    pipeline.end_session(last)
}

/// Stateful per-session processor.
///
/// Owns the stability filters and the session aggregator. Stability state is
/// reset on every session start and survives across ticks otherwise.
#[derive(Debug, Clone)]
pub struct ProctorPipeline {
    config: MonitorConfig,
    face: FaceTracker,
    objects: ObjectTracker,
    classifier: EventClassifier,
    session: SessionAggregator,
    last_face_state: Option<FaceState>,
}

impl ProctorPipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: MonitorConfig) -> Result<Self, ProctorError> {
        config.validate()?;
        Ok(Self {
            face: FaceTracker::new(config.face.clone(), Utc::now()),
            objects: ObjectTracker::new(&config.objects),
            classifier: EventClassifier::new(config.deductions.clone()),
            session: SessionAggregator::new(),
            last_face_state: None,
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Live (or last ended) session state
    pub fn state(&self) -> Option<&SessionState> {
        self.session.state()
    }

    /// Face state computed on the most recent tick
    pub fn last_face_state(&self) -> Option<FaceState> {
        self.last_face_state
    }

    /// Start a session with a freshly generated id
    pub fn start_session(
        &mut self,
        candidate_name: &str,
        now: DateTime<Utc>,
    ) -> Result<&SessionState, ProctorError> {
        self.start_session_with_id(Uuid::new_v4().to_string(), candidate_name, now)
    }

    /// Start a session under a caller-supplied id
    pub fn start_session_with_id(
        &mut self,
        session_id: String,
        candidate_name: &str,
        now: DateTime<Utc>,
    ) -> Result<&SessionState, ProctorError> {
        if !self.session.is_active() {
            self.face.reset(now);
            self.objects.reset();
            self.last_face_state = None;
        }
        self.session.start(session_id, candidate_name, now)
    }

    /// Run one tick of observations through every stage.
    ///
    /// Returns the events appended this tick, face events first. Fails with
    /// [`ProctorError::SessionNotActive`] if no session is running.
    pub fn process_tick(
        &mut self,
        observations: &[RawObservation],
        now: DateTime<Utc>,
    ) -> Result<Vec<CanonicalEvent>, ProctorError> {
        if !self.session.is_active() {
            return Err(ProctorError::SessionNotActive(
                self.session.phase().to_string(),
            ));
        }

        let faces: Vec<&RawObservation> = observations
            .iter()
            .filter(|obs| obs.source == SignalSource::Face && obs.label == FACE_LABEL)
            .collect();
        let objects: Vec<&RawObservation> = observations
            .iter()
            .filter(|obs| obs.source == SignalSource::Object)
            .collect();

        let face_tick = self.face.tick(&faces, now);
        let object_signals = self.objects.tick(&objects, now);
        self.last_face_state = Some(face_tick.state);

        let drafts = face_tick
            .signals
            .iter()
            .map(|signal| self.classifier.classify_face(signal))
            .chain(
                object_signals
                    .iter()
                    .map(|signal| self.classifier.classify_object(signal)),
            )
            .collect::<Vec<_>>();

        let mut events = Vec::with_capacity(drafts.len());
        for draft in drafts {
            events.push(self.session.record(draft)?.clone());
        }
        Ok(events)
    }

    /// Run one recorded frame, using its timestamp as the clock
    pub fn process_frame(
        &mut self,
        frame: &ObservationFrame,
    ) -> Result<Vec<CanonicalEvent>, ProctorError> {
        if frame.failed {
            tracing::debug!(timestamp = %frame.timestamp, "Replaying failed perception tick");
        }
        self.process_tick(&frame.to_raw(), frame.timestamp)
    }

    /// End the running session and return its final snapshot
    pub fn end_session(&mut self, now: DateTime<Utc>) -> Result<SessionSnapshot, ProctorError> {
        self.session.end(now)
    }
}
