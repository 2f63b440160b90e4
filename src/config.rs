//! Tunable constants for the monitoring pipeline
//!
//! Every threshold the pipeline uses lives here. Defaults are the reference
//! values; a whole configuration can be loaded from and saved to JSON.

use crate::error::ProctorError;
use crate::types::{EventType, Severity, MAX_INTEGRITY_SCORE};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default polling cadence
pub const DEFAULT_TICK_PERIOD_MS: u64 = 2_000;

/// Default minimum time between two events for the same label
pub const DEFAULT_COOLDOWN_MS: u64 = 8_000;

/// Eye aspect ratio below which a face counts as looking away
pub const DEFAULT_EYE_ASPECT_RATIO_THRESHOLD: f64 = 0.22;

/// How long no face may be seen before absence starts to count
pub const DEFAULT_ABSENCE_THRESHOLD_MS: u64 = 10_000;

/// Upper bound for every millisecond setting (one day)
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1_000;

fn check_duration(name: &str, value_ms: u64) -> Result<(), ProctorError> {
    if value_ms > MAX_DURATION_MS {
        return Err(ProctorError::InvalidConfig(format!(
            "{} {} exceeds {} ms",
            name, value_ms, MAX_DURATION_MS
        )));
    }
    Ok(())
}

/// Stability policy for a single label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// Consecutive ticks the label must be present before it may fire
    pub min_stable_ticks: u32,
    /// Minimum confidence for a tick to count as a hit (0-1)
    pub detection_threshold: f64,
    /// Minimum time between two firings of the label
    pub cooldown_ms: u64,
}

impl LabelPolicy {
    pub fn new(min_stable_ticks: u32, detection_threshold: f64, cooldown_ms: u64) -> Self {
        Self {
            min_stable_ticks,
            detection_threshold,
            cooldown_ms,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::milliseconds(self.cooldown_ms as i64)
    }

    fn validate(&self, name: &str) -> Result<(), ProctorError> {
        if self.min_stable_ticks == 0 {
            return Err(ProctorError::InvalidConfig(format!(
                "{}: min_stable_ticks must be at least 1",
                name
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ProctorError::InvalidConfig(format!(
                "{}: detection_threshold {} is outside [0, 1]",
                name, self.detection_threshold
            )));
        }
        check_duration(&format!("{}.cooldown_ms", name), self.cooldown_ms)
    }
}

/// Face-state classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceConfig {
    pub looking_away: LabelPolicy,
    pub multiple_faces: LabelPolicy,
    pub absent: LabelPolicy,
    /// Below this ratio a face is a looking-away candidate
    pub eye_aspect_ratio_threshold: f64,
    /// No-face ticks only count once this long has passed since the last face
    pub absence_threshold_ms: u64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            looking_away: LabelPolicy::new(5, 0.5, DEFAULT_COOLDOWN_MS),
            multiple_faces: LabelPolicy::new(4, 0.5, DEFAULT_COOLDOWN_MS),
            absent: LabelPolicy::new(5, 0.5, DEFAULT_COOLDOWN_MS),
            eye_aspect_ratio_threshold: DEFAULT_EYE_ASPECT_RATIO_THRESHOLD,
            absence_threshold_ms: DEFAULT_ABSENCE_THRESHOLD_MS,
        }
    }
}

impl FaceConfig {
    pub fn absence_threshold(&self) -> Duration {
        Duration::milliseconds(self.absence_threshold_ms as i64)
    }
}

/// Object-presence settings, shared by every tracked object class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub policy: LabelPolicy,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            policy: LabelPolicy::new(2, 0.75, DEFAULT_COOLDOWN_MS),
        }
    }
}

/// Points removed from the integrity score per event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionTable {
    pub focus_lost: u32,
    pub face_absent: u32,
    pub multiple_faces: u32,
    pub phone_detected: u32,
    pub book_detected: u32,
    pub device_detected: u32,
}

impl Default for DeductionTable {
    fn default() -> Self {
        Self {
            focus_lost: 5,
            face_absent: 10,
            multiple_faces: 10,
            phone_detected: 20,
            book_detected: 20,
            device_detected: 10,
        }
    }
}

impl DeductionTable {
    pub fn deduction(&self, event_type: EventType) -> u32 {
        match event_type {
            EventType::FocusLost => self.focus_lost,
            EventType::FaceAbsent => self.face_absent,
            EventType::MultipleFaces => self.multiple_faces,
            EventType::PhoneDetected => self.phone_detected,
            EventType::BookDetected => self.book_detected,
            EventType::DeviceDetected => self.device_detected,
        }
    }
}

/// Alert lifetimes per situation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// TTL for looking-away alerts
    pub focus_lost_ttl_ms: u64,
    /// TTL for every other event alert
    pub event_ttl_ms: u64,
    /// TTL for persistence failure warnings
    pub delivery_failure_ttl_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            focus_lost_ttl_ms: 3_000,
            event_ttl_ms: 5_000,
            delivery_failure_ttl_ms: 3_000,
        }
    }
}

impl AlertConfig {
    /// Severity and TTL of the alert dispatched for an event
    pub fn for_event(&self, event_type: EventType) -> (Severity, u64) {
        match event_type {
            EventType::FocusLost => (Severity::Warning, self.focus_lost_ttl_ms),
            EventType::DeviceDetected => (Severity::Warning, self.event_ttl_ms),
            EventType::FaceAbsent
            | EventType::MultipleFaces
            | EventType::PhoneDetected
            | EventType::BookDetected => (Severity::Error, self.event_ttl_ms),
        }
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub tick_period_ms: u64,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub objects: ObjectConfig,
    #[serde(default)]
    pub deductions: DeductionTable,
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            face: FaceConfig::default(),
            objects: ObjectConfig::default(),
            deductions: DeductionTable::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_period_ms)
    }

    /// Check every value is usable
    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.tick_period_ms == 0 {
            return Err(ProctorError::InvalidConfig(
                "tick_period_ms must be positive".to_string(),
            ));
        }
        check_duration("tick_period_ms", self.tick_period_ms)?;
        check_duration("face.absence_threshold_ms", self.face.absence_threshold_ms)?;
        check_duration("alerts.focus_lost_ttl_ms", self.alerts.focus_lost_ttl_ms)?;
        check_duration("alerts.event_ttl_ms", self.alerts.event_ttl_ms)?;
        check_duration(
            "alerts.delivery_failure_ttl_ms",
            self.alerts.delivery_failure_ttl_ms,
        )?;

        self.face.looking_away.validate("face.looking_away")?;
        self.face.multiple_faces.validate("face.multiple_faces")?;
        self.face.absent.validate("face.absent")?;
        self.objects.policy.validate("objects.policy")?;

        if self.face.eye_aspect_ratio_threshold <= 0.0 {
            return Err(ProctorError::InvalidConfig(
                "face.eye_aspect_ratio_threshold must be positive".to_string(),
            ));
        }

        for event_type in EventType::ALL {
            let deduction = self.deductions.deduction(event_type);
            if deduction > MAX_INTEGRITY_SCORE {
                return Err(ProctorError::InvalidConfig(format!(
                    "deduction for {} ({}) exceeds {}",
                    event_type, deduction, MAX_INTEGRITY_SCORE
                )));
            }
        }

        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ProctorError> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ProctorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_reference_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_period_ms, 2_000);
        assert_eq!(config.objects.policy.min_stable_ticks, 2);
        assert_eq!(config.objects.policy.detection_threshold, 0.75);
        assert_eq!(config.objects.policy.cooldown_ms, 8_000);
        assert_eq!(config.face.absence_threshold_ms, 10_000);
        assert_eq!(config.face.eye_aspect_ratio_threshold, 0.22);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deduction_table() {
        let table = DeductionTable::default();
        assert_eq!(table.deduction(EventType::FocusLost), 5);
        assert_eq!(table.deduction(EventType::FaceAbsent), 10);
        assert_eq!(table.deduction(EventType::MultipleFaces), 10);
        assert_eq!(table.deduction(EventType::PhoneDetected), 20);
        assert_eq!(table.deduction(EventType::BookDetected), 20);
        assert_eq!(table.deduction(EventType::DeviceDetected), 10);
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let mut config = MonitorConfig::default();
        config.objects.policy.cooldown_ms = 4_000;

        let json = config.to_json().unwrap();
        let loaded = MonitorConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = MonitorConfig::from_json(r#"{"tick_period_ms": 1000}"#).unwrap();
        assert_eq!(config.tick_period_ms, 1_000);
        assert_eq!(config.deductions, DeductionTable::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = MonitorConfig::default();
        config.objects.policy.min_stable_ticks = 0;
        assert!(matches!(
            config.validate(),
            Err(ProctorError::InvalidConfig(_))
        ));

        let mut config = MonitorConfig::default();
        config.face.absent.detection_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.deductions.phone_detected = 150;
        assert!(config.validate().is_err());

        assert!(MonitorConfig::from_json(r#"{"tick_period_ms": 0}"#).is_err());
    }

    #[test]
    fn test_rejects_durations_that_would_wrap() {
        let mut config = MonitorConfig::default();
        config.objects.policy.cooldown_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ProctorError::InvalidConfig(_))
        ));

        let mut config = MonitorConfig::default();
        config.face.absence_threshold_ms = i64::MAX as u64 + 1;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.face.looking_away.cooldown_ms = MAX_DURATION_MS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.face.looking_away.cooldown(),
            Duration::milliseconds(MAX_DURATION_MS as i64)
        );
    }

    #[test]
    fn test_alert_policy_for_events() {
        let alerts = AlertConfig::default();
        assert_eq!(
            alerts.for_event(EventType::FocusLost),
            (Severity::Warning, 3_000)
        );
        assert_eq!(
            alerts.for_event(EventType::PhoneDetected),
            (Severity::Error, 5_000)
        );
    }
}
