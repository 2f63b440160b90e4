//! Object-presence tracking
//!
//! Object classifier labels follow the COCO vocabulary. Only the classes that
//! indicate a possible integrity violation are tracked; everything else the
//! classifier reports (people, cups, chairs...) is dropped here.

use crate::config::ObjectConfig;
use crate::stability::{QualifyingSignal, StabilityFilter};
use crate::types::{EventType, RawObservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracked object classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    CellPhone,
    Book,
    Laptop,
    Mouse,
    Keyboard,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 5] = [
        ObjectClass::CellPhone,
        ObjectClass::Book,
        ObjectClass::Laptop,
        ObjectClass::Mouse,
        ObjectClass::Keyboard,
    ];

    /// Map a classifier label to a tracked class
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "cell phone" | "cell_phone" | "phone" => Some(ObjectClass::CellPhone),
            "book" => Some(ObjectClass::Book),
            "laptop" => Some(ObjectClass::Laptop),
            "mouse" => Some(ObjectClass::Mouse),
            "keyboard" => Some(ObjectClass::Keyboard),
            _ => None,
        }
    }

    /// COCO class name
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::CellPhone => "cell phone",
            ObjectClass::Book => "book",
            ObjectClass::Laptop => "laptop",
            ObjectClass::Mouse => "mouse",
            ObjectClass::Keyboard => "keyboard",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ObjectClass::CellPhone => EventType::PhoneDetected,
            ObjectClass::Book => EventType::BookDetected,
            ObjectClass::Laptop | ObjectClass::Mouse | ObjectClass::Keyboard => {
                EventType::DeviceDetected
            }
        }
    }
}

/// Object stability filter over the tracked classes
#[derive(Debug, Clone)]
pub struct ObjectTracker {
    filter: StabilityFilter<ObjectClass>,
}

impl ObjectTracker {
    pub fn new(config: &ObjectConfig) -> Self {
        Self {
            filter: StabilityFilter::new(config.policy),
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }

    pub fn filter(&self) -> &StabilityFilter<ObjectClass> {
        &self.filter
    }

    /// Apply one tick of object observations. Untracked labels are ignored.
    pub fn tick(
        &mut self,
        objects: &[&RawObservation],
        now: DateTime<Utc>,
    ) -> Vec<QualifyingSignal<ObjectClass>> {
        let present = objects.iter().filter_map(|obs| match ObjectClass::from_label(&obs.label) {
            Some(class) => Some((class, obs.confidence)),
            None => {
                tracing::trace!(label = %obs.label, "Ignoring untracked object label");
                None
            }
        });
        self.filter.tick(present, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(ObjectClass::from_label("cell phone"), Some(ObjectClass::CellPhone));
        assert_eq!(ObjectClass::from_label(" Book "), Some(ObjectClass::Book));
        assert_eq!(ObjectClass::from_label("person"), None);
        assert_eq!(ObjectClass::from_label("cup"), None);

        for class in ObjectClass::ALL {
            assert_eq!(ObjectClass::from_label(class.label()), Some(class));
        }
    }

    #[test]
    fn test_device_classes_share_event_type() {
        assert_eq!(ObjectClass::Laptop.event_type(), EventType::DeviceDetected);
        assert_eq!(ObjectClass::Mouse.event_type(), EventType::DeviceDetected);
        assert_eq!(ObjectClass::Keyboard.event_type(), EventType::DeviceDetected);
        assert_eq!(ObjectClass::CellPhone.event_type(), EventType::PhoneDetected);
    }

    #[test]
    fn test_untracked_labels_never_fire() {
        let mut tracker = ObjectTracker::new(&ObjectConfig::default());
        for secs in 0..10 {
            let person = RawObservation::object("person", 0.99, t(secs));
            assert!(tracker.tick(&[&person], t(secs)).is_empty());
        }
    }

    #[test]
    fn test_two_stable_ticks_fire() {
        let mut tracker = ObjectTracker::new(&ObjectConfig::default());
        let phone = RawObservation::object("cell phone", 0.9, t(0));
        let cup = RawObservation::object("cup", 0.9, t(0));

        assert!(tracker.tick(&[&phone, &cup], t(0)).is_empty());
        let fired = tracker.tick(&[&phone, &cup], t(2));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].label, ObjectClass::CellPhone);
    }

    #[test]
    fn test_each_device_class_is_tracked_separately() {
        let mut tracker = ObjectTracker::new(&ObjectConfig::default());
        let laptop = RawObservation::object("laptop", 0.9, t(0));
        let mouse = RawObservation::object("mouse", 0.9, t(0));

        tracker.tick(&[&laptop], t(0));
        tracker.tick(&[&mouse], t(2));
        assert_eq!(
            tracker
                .filter()
                .state(&ObjectClass::Laptop)
                .unwrap()
                .consecutive_hit_count,
            0
        );
        let fired = tracker.tick(&[&mouse], t(4));
        assert_eq!(fired[0].label, ObjectClass::Mouse);
    }
}
