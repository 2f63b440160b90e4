//! Event classification
//!
//! Maps a qualifying label to exactly one canonical event type with a fixed
//! deduction. Confidence is carried along for reporting only; it never changes
//! the deduction.

use crate::config::DeductionTable;
use crate::face::FaceLabel;
use crate::objects::ObjectClass;
use crate::stability::QualifyingSignal;
use crate::types::EventType;
use chrono::{DateTime, Utc};

/// An event that has been classified but not yet appended to a session
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub details: String,
    pub deduction: u32,
}

/// Classifier applying the deduction table
#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    deductions: DeductionTable,
}

impl EventClassifier {
    pub fn new(deductions: DeductionTable) -> Self {
        Self { deductions }
    }

    pub fn deductions(&self) -> &DeductionTable {
        &self.deductions
    }

    pub fn classify_face(&self, signal: &QualifyingSignal<FaceLabel>) -> EventDraft {
        let details = match signal.label {
            FaceLabel::LookingAway => "Candidate looking away from screen".to_string(),
            FaceLabel::MultipleFaces => "Multiple faces detected in frame".to_string(),
            FaceLabel::Absent => "No face detected in frame".to_string(),
        };
        self.draft(signal.label.event_type(), signal.fired_at, signal.confidence, details)
    }

    pub fn classify_object(&self, signal: &QualifyingSignal<ObjectClass>) -> EventDraft {
        let details = format!(
            "{} detected with {:.1}% confidence",
            signal.label.label(),
            signal.confidence * 100.0
        );
        self.draft(signal.label.event_type(), signal.fired_at, signal.confidence, details)
    }

    fn draft(
        &self,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        confidence: f64,
        details: String,
    ) -> EventDraft {
        EventDraft {
            event_type,
            timestamp,
            confidence,
            details,
            deduction: self.deductions.deduction(event_type),
        }
    }
}
