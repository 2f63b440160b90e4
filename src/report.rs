//! Session summaries
//!
//! A condensed, human-facing view of a finished session: the rating, the
//! headline counters and how many times each event type occurred.

use crate::types::{EventType, IntegrityRating, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// Count and total deduction for one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBreakdown {
    pub event_type: EventType,
    pub count: u32,
    pub points_deducted: u32,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub candidate_name: String,
    pub duration_secs: i64,
    pub integrity_score: u32,
    pub rating: IntegrityRating,
    pub total_events: usize,
    pub focus_lost_count: u32,
    pub suspicious_event_count: u32,
    /// Types that occurred at least once, in canonical order
    pub breakdown: Vec<EventBreakdown>,
}

impl SessionSummary {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let breakdown = EventType::ALL
            .iter()
            .filter_map(|&event_type| {
                let matching = snapshot
                    .events
                    .iter()
                    .filter(|e| e.event_type == event_type);
                let (count, points_deducted) =
                    matching.fold((0u32, 0u32), |(n, pts), e| (n + 1, pts + e.deduction));
                (count > 0).then_some(EventBreakdown {
                    event_type,
                    count,
                    points_deducted,
                })
            })
            .collect();

        Self {
            session_id: snapshot.session_id.clone(),
            candidate_name: snapshot.candidate_name.clone(),
            duration_secs: snapshot.duration_secs,
            integrity_score: snapshot.integrity_score,
            rating: snapshot.rating,
            total_events: snapshot.events.len(),
            focus_lost_count: snapshot.focus_lost_count,
            suspicious_event_count: snapshot.suspicious_event_count,
            breakdown,
        }
    }

    /// Plain-text rendering for terminals
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Session {} ({})\nDuration: {}s\nIntegrity: {} ({})\nEvents: {} total, {} focus lost, {} suspicious\n",
            self.session_id,
            self.candidate_name,
            self.duration_secs,
            self.integrity_score,
            self.rating.as_str(),
            self.total_events,
            self.focus_lost_count,
            self.suspicious_event_count,
        );
        for row in &self.breakdown {
            out.push_str(&format!(
                "  {:<16} x{:<3} -{}\n",
                row.event_type.as_str(),
                row.count,
                row.points_deducted
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalEvent, DetectionStats};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn event(id: u64, event_type: EventType, deduction: u32) -> CanonicalEvent {
        CanonicalEvent {
            id,
            event_type,
            timestamp: Utc::now(),
            confidence: 0.9,
            details: String::new(),
            deduction,
        }
    }

    #[test]
    fn test_breakdown_skips_absent_types() {
        let now = Utc::now();
        let snapshot = SessionSnapshot {
            session_id: "s-1".to_string(),
            candidate_name: "Ada".to_string(),
            started_at: now,
            ended_at: now,
            duration_secs: 300,
            events: vec![
                event(1, EventType::PhoneDetected, 20),
                event(2, EventType::FocusLost, 5),
                event(3, EventType::PhoneDetected, 20),
            ],
            focus_lost_count: 1,
            suspicious_event_count: 2,
            integrity_score: 55,
            detection_stats: DetectionStats::default(),
            rating: IntegrityRating::Poor,
        };

        let summary = SessionSummary::from_snapshot(&snapshot);
        assert_eq!(summary.total_events, 3);
        assert_eq!(
            summary.breakdown,
            vec![
                EventBreakdown {
                    event_type: EventType::FocusLost,
                    count: 1,
                    points_deducted: 5,
                },
                EventBreakdown {
                    event_type: EventType::PhoneDetected,
                    count: 2,
                    points_deducted: 40,
                },
            ]
        );

        let text = summary.to_text();
        assert!(text.contains("Integrity: 55 (poor)"));
        assert!(text.contains("phone_detected"));
    }
}
