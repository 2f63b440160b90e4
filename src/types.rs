//! Core types for the Proctor Sentinel pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw observations, canonical events, alerts and session snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label carried by face observations (one observation per detected face)
pub const FACE_LABEL: &str = "face";

/// Starting (and maximum) integrity score of every session
pub const MAX_INTEGRITY_SCORE: u32 = 100;

/// Independent signal sources produced by the perception layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Face,
    Object,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Face => "face",
            SignalSource::Object => "object",
        }
    }
}

/// One labeled observation emitted by the perception layer for a single tick.
///
/// Observations are transient: they feed the stability filters and are never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Which classifier produced this observation
    pub source: SignalSource,
    /// Classifier output (COCO class name for objects, `face` for faces)
    pub label: String,
    /// Classifier confidence (0-1)
    pub confidence: f64,
    /// When the frame was sampled
    pub timestamp: DateTime<Utc>,
    /// Eye openness ratio for face observations, if the classifier measured it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_aspect_ratio: Option<f64>,
}

impl RawObservation {
    /// A detected face, optionally with its eye aspect ratio
    pub fn face(confidence: f64, eye_aspect_ratio: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: SignalSource::Face,
            label: FACE_LABEL.to_string(),
            confidence,
            timestamp,
            eye_aspect_ratio,
        }
    }

    /// A detected object of the given class
    pub fn object(label: impl Into<String>, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: SignalSource::Object,
            label: label.into(),
            confidence,
            timestamp,
            eye_aspect_ratio: None,
        }
    }
}

/// Canonical integrity event types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FocusLost,
    FaceAbsent,
    MultipleFaces,
    PhoneDetected,
    BookDetected,
    DeviceDetected,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::FocusLost,
        EventType::FaceAbsent,
        EventType::MultipleFaces,
        EventType::PhoneDetected,
        EventType::BookDetected,
        EventType::DeviceDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FocusLost => "focus_lost",
            EventType::FaceAbsent => "face_absent",
            EventType::MultipleFaces => "multiple_faces",
            EventType::PhoneDetected => "phone_detected",
            EventType::BookDetected => "book_detected",
            EventType::DeviceDetected => "device_detected",
        }
    }

    /// Which signal source the event originates from
    pub fn category(&self) -> EventCategory {
        match self {
            EventType::FocusLost | EventType::FaceAbsent | EventType::MultipleFaces => {
                EventCategory::Face
            }
            EventType::PhoneDetected | EventType::BookDetected | EventType::DeviceDetected => {
                EventCategory::Object
            }
        }
    }

    /// Every object event plus multiple faces counts as suspicious
    pub fn is_suspicious(&self) -> bool {
        matches!(self.category(), EventCategory::Object) || *self == EventType::MultipleFaces
    }

    pub fn is_focus_lost(&self) -> bool {
        *self == EventType::FocusLost
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of an event, used to partition detection stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Face,
    Object,
}

/// A de-duplicated integrity event. Immutable once appended to a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Monotonic per-session sequence number, starting at 1
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Classifier confidence at the firing tick; diagnostic only
    pub confidence: f64,
    pub details: String,
    /// Points removed from the integrity score by this event
    pub deduction: u32,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Alert identifier, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", self.0)
    }
}

/// A transient, user-facing notification. Alerts never affect the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
}

/// Event counts partitioned by origin and by type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Equal to the number of events in the session log
    pub total: u32,
    /// Events of face origin
    pub face: u32,
    /// Events of object origin
    pub object: u32,
    /// Per-type breakdown
    #[serde(default)]
    pub by_type: BTreeMap<EventType, u32>,
}

impl DetectionStats {
    pub fn record(&mut self, event_type: EventType) {
        self.total += 1;
        match event_type.category() {
            EventCategory::Face => self.face += 1,
            EventCategory::Object => self.object += 1,
        }
        *self.by_type.entry(event_type).or_insert(0) += 1;
    }

    pub fn count(&self, event_type: EventType) -> u32 {
        self.by_type.get(&event_type).copied().unwrap_or(0)
    }
}

/// Coarse rating bucket for an integrity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityRating {
    Good,
    Fair,
    Poor,
}

impl IntegrityRating {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            IntegrityRating::Good
        } else if score >= 60 {
            IntegrityRating::Fair
        } else {
            IntegrityRating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityRating::Good => "good",
            IntegrityRating::Fair => "fair",
            IntegrityRating::Poor => "poor",
        }
    }
}

/// Final state of a session, handed to the persistence gateway on end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub candidate_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub events: Vec<CanonicalEvent>,
    pub focus_lost_count: u32,
    pub suspicious_event_count: u32,
    pub integrity_score: u32,
    pub detection_stats: DetectionStats,
    pub rating: IntegrityRating,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_type_has_one_category() {
        let face: Vec<_> = EventType::ALL
            .iter()
            .filter(|t| t.category() == EventCategory::Face)
            .collect();
        assert_eq!(face.len(), 3);
        assert!(EventType::MultipleFaces.is_suspicious());
        assert!(!EventType::FaceAbsent.is_suspicious());
        assert!(!EventType::FocusLost.is_suspicious());
        assert!(EventType::DeviceDetected.is_suspicious());
    }

    #[test]
    fn test_event_type_serde_names() {
        let json = serde_json::to_string(&EventType::PhoneDetected).unwrap();
        assert_eq!(json, "\"phone_detected\"");
        let parsed: EventType = serde_json::from_str("\"focus_lost\"").unwrap();
        assert_eq!(parsed, EventType::FocusLost);
    }

    #[test]
    fn test_detection_stats_partition() {
        let mut stats = DetectionStats::default();
        stats.record(EventType::PhoneDetected);
        stats.record(EventType::PhoneDetected);
        stats.record(EventType::FocusLost);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.face + stats.object, stats.total);
        assert_eq!(stats.count(EventType::PhoneDetected), 2);
        assert_eq!(stats.count(EventType::BookDetected), 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_type"]["phone_detected"], 2);
    }

    #[test]
    fn test_rating_buckets() {
        assert_eq!(IntegrityRating::from_score(100), IntegrityRating::Good);
        assert_eq!(IntegrityRating::from_score(80), IntegrityRating::Good);
        assert_eq!(IntegrityRating::from_score(79), IntegrityRating::Fair);
        assert_eq!(IntegrityRating::from_score(60), IntegrityRating::Fair);
        assert_eq!(IntegrityRating::from_score(0), IntegrityRating::Poor);
    }

    #[test]
    fn test_observation_constructors() {
        let now = Utc::now();
        let face = RawObservation::face(0.9, Some(0.3), now);
        assert_eq!(face.source, SignalSource::Face);
        assert_eq!(face.label, FACE_LABEL);

        let phone = RawObservation::object("cell phone", 0.8, now);
        let json = serde_json::to_value(&phone).unwrap();
        assert!(json.get("eye_aspect_ratio").is_none());
        assert_eq!(json["source"], "object");
    }
}
