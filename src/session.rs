//! Session aggregation
//!
//! The [`SessionAggregator`] owns the append-only event log and everything
//! derived from it: counters, detection stats and the running integrity score.
//! Each event is applied in a single `&mut self` step, so the log and the
//! counters can never be observed out of step.
//!
//! Lifecycle: `Idle -> Active` on start, `Active -> Ended` on end, and back to
//! `Active` only through another explicit start.

use crate::classifier::EventDraft;
use crate::error::ProctorError;
use crate::types::{
    CanonicalEvent, DetectionStats, IntegrityRating, SessionSnapshot, MAX_INTEGRITY_SCORE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Ended,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Active => "active",
            SessionPhase::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Live state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub candidate_name: String,
    pub started_at: DateTime<Utc>,
    pub events: Vec<CanonicalEvent>,
    pub focus_lost_count: u32,
    pub suspicious_event_count: u32,
    pub integrity_score: u32,
    pub detection_stats: DetectionStats,
}

impl SessionState {
    fn new(session_id: String, candidate_name: String, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            candidate_name,
            started_at,
            events: Vec::new(),
            focus_lost_count: 0,
            suspicious_event_count: 0,
            integrity_score: MAX_INTEGRITY_SCORE,
            detection_stats: DetectionStats::default(),
        }
    }

    fn apply(&mut self, event: CanonicalEvent) {
        if event.event_type.is_focus_lost() {
            self.focus_lost_count += 1;
        }
        if event.event_type.is_suspicious() {
            self.suspicious_event_count += 1;
        }
        self.integrity_score = apply_deduction(self.integrity_score, event.deduction);
        self.detection_stats.record(event.event_type);
        self.events.push(event);
    }

    pub fn rating(&self) -> IntegrityRating {
        IntegrityRating::from_score(self.integrity_score)
    }
}

/// The score reduction applied once per event
pub fn apply_deduction(score: u32, deduction: u32) -> u32 {
    score.saturating_sub(deduction)
}

/// Recompute the score by replaying an ordered event log from the start
pub fn replay_score(events: &[CanonicalEvent]) -> u32 {
    events
        .iter()
        .fold(MAX_INTEGRITY_SCORE, |score, event| {
            apply_deduction(score, event.deduction)
        })
}

/// Rebuild the derived session state from an ordered event log
pub fn replay_events(
    session_id: &str,
    candidate_name: &str,
    started_at: DateTime<Utc>,
    events: &[CanonicalEvent],
) -> SessionState {
    let mut state = SessionState::new(session_id.to_string(), candidate_name.to_string(), started_at);
    for event in events {
        state.apply(event.clone());
    }
    state
}

/// Session state machine and single source of truth for a session
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    phase: SessionPhase,
    state: Option<SessionState>,
    next_event_id: u64,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            state: None,
            next_event_id: 1,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Current (or last ended) session state
    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// Start a fresh session, discarding anything left from the previous one
    pub fn start(
        &mut self,
        session_id: impl Into<String>,
        candidate_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<&SessionState, ProctorError> {
        if let (SessionPhase::Active, Some(state)) = (self.phase, &self.state) {
            return Err(ProctorError::SessionAlreadyActive(state.session_id.clone()));
        }

        let state = SessionState::new(session_id.into(), candidate_name.into(), now);
        tracing::info!(
            session_id = %state.session_id,
            candidate = %state.candidate_name,
            "Session started"
        );

        self.phase = SessionPhase::Active;
        self.next_event_id = 1;
        Ok(self.state.insert(state))
    }

    /// Append one event and update every derived value with it.
    ///
    /// Fails with [`ProctorError::SessionNotActive`] outside the `Active`
    /// phase; callers must never push events into an idle or ended session.
    pub fn record(&mut self, draft: EventDraft) -> Result<&CanonicalEvent, ProctorError> {
        let state = match (self.phase, self.state.as_mut()) {
            (SessionPhase::Active, Some(state)) => state,
            (phase, _) => {
                tracing::error!(
                    phase = %phase,
                    event_type = %draft.event_type,
                    "Event recorded outside an active session"
                );
                return Err(ProctorError::SessionNotActive(phase.to_string()));
            }
        };

        let event = CanonicalEvent {
            id: self.next_event_id,
            event_type: draft.event_type,
            timestamp: draft.timestamp,
            confidence: draft.confidence,
            details: draft.details,
            deduction: draft.deduction,
        };
        self.next_event_id += 1;

        state.apply(event);
        let event = &state.events[state.events.len() - 1];

        tracing::debug!(
            session_id = %state.session_id,
            event_id = event.id,
            event_type = %event.event_type,
            deduction = event.deduction,
            score = state.integrity_score,
            "Event recorded"
        );
        Ok(event)
    }

    /// Stop accepting events and produce the final snapshot
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<SessionSnapshot, ProctorError> {
        let state = match (self.phase, self.state.as_ref()) {
            (SessionPhase::Active, Some(state)) => state,
            (phase, _) => return Err(ProctorError::SessionNotActive(phase.to_string())),
        };

        let snapshot = SessionSnapshot {
            session_id: state.session_id.clone(),
            candidate_name: state.candidate_name.clone(),
            started_at: state.started_at,
            ended_at: now,
            duration_secs: (now - state.started_at).num_seconds().max(0),
            events: state.events.clone(),
            focus_lost_count: state.focus_lost_count,
            suspicious_event_count: state.suspicious_event_count,
            integrity_score: state.integrity_score,
            detection_stats: state.detection_stats.clone(),
            rating: state.rating(),
        };

        tracing::info!(
            session_id = %snapshot.session_id,
            events = snapshot.events.len(),
            score = snapshot.integrity_score,
            duration_secs = snapshot.duration_secs,
            "Session ended"
        );

        self.phase = SessionPhase::Ended;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventCategory, EventType};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn draft(event_type: EventType, deduction: u32) -> EventDraft {
        EventDraft {
            event_type,
            timestamp: t(1),
            confidence: 0.9,
            details: event_type.to_string(),
            deduction,
        }
    }

    fn active() -> SessionAggregator {
        let mut aggregator = SessionAggregator::new();
        aggregator.start("session-1", "Ada", t(0)).unwrap();
        aggregator
    }

    #[test]
    fn test_start_resets_state() {
        let aggregator = active();
        let state = aggregator.state().unwrap();
        assert_eq!(aggregator.phase(), SessionPhase::Active);
        assert_eq!(state.integrity_score, 100);
        assert!(state.events.is_empty());
        assert_eq!(state.detection_stats, DetectionStats::default());
    }

    #[test]
    fn test_record_updates_everything_together() {
        let mut aggregator = active();
        aggregator.record(draft(EventType::PhoneDetected, 20)).unwrap();
        aggregator.record(draft(EventType::FocusLost, 5)).unwrap();
        aggregator.record(draft(EventType::FaceAbsent, 10)).unwrap();

        let state = aggregator.state().unwrap();
        assert_eq!(state.events.len(), 3);
        assert_eq!(state.integrity_score, 65);
        assert_eq!(state.focus_lost_count, 1);
        assert_eq!(state.suspicious_event_count, 1);
        assert_eq!(state.detection_stats.total, 3);
        assert_eq!(state.detection_stats.face, 2);
        assert_eq!(state.detection_stats.object, 1);
        let ids: Vec<u64> = state.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_score_floors_at_zero_and_never_increases() {
        let mut aggregator = active();
        let mut previous = 100;
        for _ in 0..10 {
            let event = aggregator.record(draft(EventType::BookDetected, 20)).unwrap();
            assert_eq!(event.deduction, 20);
            let score = aggregator.state().unwrap().integrity_score;
            assert!(score <= previous);
            previous = score;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_counters_match_event_log() {
        let mut aggregator = active();
        for event_type in EventType::ALL.iter().cycle().take(17) {
            aggregator.record(draft(*event_type, 3)).unwrap();
        }
        let state = aggregator.state().unwrap();
        let focus = state.events.iter().filter(|e| e.event_type.is_focus_lost()).count();
        let suspicious = state.events.iter().filter(|e| e.event_type.is_suspicious()).count();
        let object = state
            .events
            .iter()
            .filter(|e| e.event_type.category() == EventCategory::Object)
            .count();

        assert_eq!(state.focus_lost_count as usize, focus);
        assert_eq!(state.suspicious_event_count as usize, suspicious);
        assert_eq!(state.detection_stats.object as usize, object);
        assert_eq!(state.detection_stats.total as usize, state.events.len());
        assert!(focus + suspicious <= state.events.len());
    }

    #[test]
    fn test_record_outside_active_fails() {
        let mut aggregator = SessionAggregator::new();
        let err = aggregator.record(draft(EventType::FocusLost, 5)).unwrap_err();
        assert!(matches!(err, ProctorError::SessionNotActive(phase) if phase == "idle"));

        let mut aggregator = active();
        aggregator.end(t(60)).unwrap();
        assert!(matches!(
            aggregator.record(draft(EventType::FocusLost, 5)),
            Err(ProctorError::SessionNotActive(_))
        ));
        assert!(aggregator.end(t(61)).is_err());
    }

    #[test]
    fn test_start_while_active_is_rejected() {
        let mut aggregator = active();
        assert!(matches!(
            aggregator.start("session-2", "Grace", t(5)),
            Err(ProctorError::SessionAlreadyActive(id)) if id == "session-1"
        ));
    }

    #[test]
    fn test_restart_after_end_clears_log() {
        let mut aggregator = active();
        aggregator.record(draft(EventType::PhoneDetected, 20)).unwrap();
        aggregator.end(t(30)).unwrap();

        aggregator.start("session-2", "Grace", t(40)).unwrap();
        let state = aggregator.state().unwrap();
        assert_eq!(state.session_id, "session-2");
        assert!(state.events.is_empty());
        assert_eq!(state.integrity_score, 100);

        let event = aggregator.record(draft(EventType::FocusLost, 5)).unwrap();
        assert_eq!(event.id, 1);
    }

    #[test]
    fn test_snapshot_and_replay_agree() {
        let mut aggregator = active();
        for (event_type, deduction) in [
            (EventType::PhoneDetected, 20),
            (EventType::MultipleFaces, 10),
            (EventType::FocusLost, 5),
            (EventType::BookDetected, 20),
            (EventType::PhoneDetected, 20),
            (EventType::DeviceDetected, 10),
            (EventType::FaceAbsent, 10),
        ] {
            aggregator.record(draft(event_type, deduction)).unwrap();
        }
        let snapshot = aggregator.end(t(125)).unwrap();

        assert_eq!(snapshot.duration_secs, 125);
        assert_eq!(snapshot.integrity_score, 5);
        assert_eq!(snapshot.rating, IntegrityRating::Poor);
        assert_eq!(replay_score(&snapshot.events), snapshot.integrity_score);

        let rebuilt = replay_events(
            &snapshot.session_id,
            &snapshot.candidate_name,
            snapshot.started_at,
            &snapshot.events,
        );
        assert_eq!(rebuilt.integrity_score, snapshot.integrity_score);
        assert_eq!(rebuilt.focus_lost_count, snapshot.focus_lost_count);
        assert_eq!(rebuilt.suspicious_event_count, snapshot.suspicious_event_count);
        assert_eq!(rebuilt.detection_stats, snapshot.detection_stats);
    }
}
