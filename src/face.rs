//! Face-state classification
//!
//! Each tick the detected faces are reduced to one of four mutually exclusive
//! states. Three of them (looking away, multiple faces, sustained absence) are
//! tracked as independent labels in one [`StabilityFilter`]; an attentive
//! single face never fires.

use crate::config::FaceConfig;
use crate::stability::{QualifyingSignal, StabilityFilter};
use crate::types::{EventType, RawObservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-tick face state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceState {
    PresentAttentive,
    PresentLookingAway,
    Absent,
    Multiple,
}

/// Face labels that can fire events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceLabel {
    LookingAway,
    MultipleFaces,
    Absent,
}

impl FaceLabel {
    pub fn event_type(&self) -> EventType {
        match self {
            FaceLabel::LookingAway => EventType::FocusLost,
            FaceLabel::MultipleFaces => EventType::MultipleFaces,
            FaceLabel::Absent => EventType::FaceAbsent,
        }
    }
}

/// 2D landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Eye aspect ratio from six eye landmarks.
///
/// Points 0 and 3 are the eye corners; (1, 5) and (2, 4) are the vertical
/// pairs. Returns `None` for a degenerate eye with zero width.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> Option<f64> {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f64::EPSILON {
        return None;
    }
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    Some(vertical / (2.0 * horizontal))
}

/// Mean eye aspect ratio over both eyes
pub fn average_eye_aspect_ratio(left: &[Point; 6], right: &[Point; 6]) -> Option<f64> {
    match (eye_aspect_ratio(left), eye_aspect_ratio(right)) {
        (Some(l), Some(r)) => Some((l + r) / 2.0),
        (Some(one), None) | (None, Some(one)) => Some(one),
        (None, None) => None,
    }
}

/// Reduce the faces seen this tick to a single state and the confidence
/// backing it.
pub fn classify_faces(faces: &[&RawObservation], ear_threshold: f64) -> (FaceState, f64) {
    match faces {
        [] => (FaceState::Absent, 1.0),
        [face] => {
            let looking_away = face
                .eye_aspect_ratio
                .map(|ear| ear < ear_threshold)
                .unwrap_or(false);
            if looking_away {
                (FaceState::PresentLookingAway, face.confidence)
            } else {
                (FaceState::PresentAttentive, face.confidence)
            }
        }
        _ => {
            // A second face is only as certain as the weaker of the top two.
            let mut confidences: Vec<f64> = faces.iter().map(|f| f.confidence).collect();
            confidences.sort_by(|a, b| b.total_cmp(a));
            (FaceState::Multiple, confidences[1])
        }
    }
}

/// Result of one face tick
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTick {
    pub state: FaceState,
    pub signals: Vec<QualifyingSignal<FaceLabel>>,
}

/// Face classification plus the face-label stability filter
#[derive(Debug, Clone)]
pub struct FaceTracker {
    config: FaceConfig,
    filter: StabilityFilter<FaceLabel>,
    last_face_seen: DateTime<Utc>,
}

impl FaceTracker {
    /// Create a tracker; absence is timed from `started_at`
    pub fn new(config: FaceConfig, started_at: DateTime<Utc>) -> Self {
        let filter = StabilityFilter::new(config.looking_away)
            .with_policy(FaceLabel::MultipleFaces, config.multiple_faces)
            .with_policy(FaceLabel::Absent, config.absent);
        Self {
            config,
            filter,
            last_face_seen: started_at,
        }
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.filter.reset();
        self.last_face_seen = now;
    }

    pub fn last_face_seen(&self) -> DateTime<Utc> {
        self.last_face_seen
    }

    pub fn filter(&self) -> &StabilityFilter<FaceLabel> {
        &self.filter
    }

    /// Apply one tick of face observations
    pub fn tick(&mut self, faces: &[&RawObservation], now: DateTime<Utc>) -> FaceTick {
        let (state, confidence) = classify_faces(faces, self.config.eye_aspect_ratio_threshold);

        let present = match state {
            FaceState::Absent => {
                // A short dropout must not count toward the absent label.
                if now - self.last_face_seen > self.config.absence_threshold() {
                    Some((FaceLabel::Absent, confidence))
                } else {
                    None
                }
            }
            FaceState::Multiple => {
                self.last_face_seen = now;
                Some((FaceLabel::MultipleFaces, confidence))
            }
            FaceState::PresentLookingAway => {
                self.last_face_seen = now;
                Some((FaceLabel::LookingAway, confidence))
            }
            FaceState::PresentAttentive => {
                self.last_face_seen = now;
                None
            }
        };

        let signals = self.filter.tick(present, now);
        FaceTick { state, signals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn attentive(at: DateTime<Utc>) -> RawObservation {
        RawObservation::face(0.95, Some(0.31), at)
    }

    fn looking_away(at: DateTime<Utc>) -> RawObservation {
        RawObservation::face(0.9, Some(0.15), at)
    }

    #[test]
    fn test_eye_aspect_ratio() {
        let eye = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.3),
            Point::new(2.0, 0.3),
            Point::new(3.0, 0.0),
            Point::new(2.0, -0.3),
            Point::new(1.0, -0.3),
        ];
        let ear = eye_aspect_ratio(&eye).unwrap();
        assert!((ear - 0.2).abs() < 1e-9);

        let flat = [Point::new(1.0, 1.0); 6];
        assert_eq!(eye_aspect_ratio(&flat), None);
        assert!((average_eye_aspect_ratio(&eye, &flat).unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_classify_faces() {
        let now = t(0);
        let a = attentive(now);
        let l = looking_away(now);
        let no_ratio = RawObservation::face(0.9, None, now);

        assert_eq!(classify_faces(&[], 0.22).0, FaceState::Absent);
        assert_eq!(classify_faces(&[&a], 0.22).0, FaceState::PresentAttentive);
        assert_eq!(classify_faces(&[&l], 0.22).0, FaceState::PresentLookingAway);
        assert_eq!(classify_faces(&[&no_ratio], 0.22).0, FaceState::PresentAttentive);

        let (state, confidence) = classify_faces(&[&a, &l], 0.22);
        assert_eq!(state, FaceState::Multiple);
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn test_brief_absence_never_fires() {
        let mut tracker = FaceTracker::new(FaceConfig::default(), t(0));
        let face = attentive(t(0));
        tracker.tick(&[&face], t(0));

        // Three empty ticks (6 s), then the face is back.
        for secs in [2, 4, 6] {
            let tick = tracker.tick(&[], t(secs));
            assert_eq!(tick.state, FaceState::Absent);
            assert!(tick.signals.is_empty());
        }
        assert!(tracker.filter().state(&FaceLabel::Absent).is_none());

        let back = attentive(t(8));
        assert!(tracker.tick(&[&back], t(8)).signals.is_empty());
    }

    #[test]
    fn test_sustained_absence_fires_after_threshold_and_stable_ticks() {
        let mut tracker = FaceTracker::new(FaceConfig::default(), t(0));
        let mut fired_at = None;
        for secs in (2..=40).step_by(2) {
            let tick = tracker.tick(&[], t(secs));
            if let Some(signal) = tick.signals.first() {
                assert_eq!(signal.label, FaceLabel::Absent);
                fired_at = Some(secs);
                break;
            }
        }
        // Absence counts from 12 s (> 10 s); five counted ticks end at 20 s.
        assert_eq!(fired_at, Some(20));
    }

    #[test]
    fn test_looking_away_needs_five_consecutive_ticks() {
        let mut tracker = FaceTracker::new(FaceConfig::default(), t(0));
        for secs in 0..4 {
            let face = looking_away(t(secs));
            assert!(tracker.tick(&[&face], t(secs)).signals.is_empty());
        }
        let face = looking_away(t(4));
        let tick = tracker.tick(&[&face], t(4));
        assert_eq!(tick.signals.len(), 1);
        assert_eq!(tick.signals[0].label.event_type(), EventType::FocusLost);
    }

    #[test]
    fn test_single_attentive_tick_resets_looking_away() {
        let mut tracker = FaceTracker::new(FaceConfig::default(), t(0));
        for secs in 0..4 {
            let face = looking_away(t(secs));
            tracker.tick(&[&face], t(secs));
        }
        let face = attentive(t(4));
        tracker.tick(&[&face], t(4));
        assert_eq!(
            tracker
                .filter()
                .state(&FaceLabel::LookingAway)
                .unwrap()
                .consecutive_hit_count,
            0
        );
    }

    #[test]
    fn test_multiple_faces_fire_after_four_ticks() {
        let mut tracker = FaceTracker::new(FaceConfig::default(), t(0));
        let mut fired = Vec::new();
        for secs in 0..4 {
            let a = attentive(t(secs));
            let b = attentive(t(secs));
            fired.extend(tracker.tick(&[&a, &b], t(secs)).signals);
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].label, FaceLabel::MultipleFaces);
        assert_eq!(tracker.last_face_seen(), t(3));
    }
}
