//! Debounce and cooldown filtering for noisy per-tick labels
//!
//! A [`StabilityFilter`] turns a bursty stream of "label present this tick"
//! observations into at most one qualifying signal per label per cooldown
//! window. It keeps one [`StabilityState`] per label it has ever seen and is a
//! pure function of that state and the current tick's input.
//!
//! Rules per tick:
//! - a label counts as present only at or above its `detection_threshold`
//! - a label present this tick has its hit count incremented
//! - a tracked label absent this tick has its hit count reset to zero
//! - a present label fires when its hit count reaches `min_stable_ticks`, its
//!   confidence reaches `detection_threshold` and its cooldown has elapsed
//! - firing records the time and resets the hit count, so a label that stays
//!   in view must re-accumulate before it can fire again

use crate::config::LabelPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-label debounce state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityState {
    pub consecutive_hit_count: u32,
    pub last_fired_at: Option<DateTime<Utc>>,
}

/// A label that passed the stability and cooldown checks on this tick
#[derive(Debug, Clone, PartialEq)]
pub struct QualifyingSignal<L> {
    pub label: L,
    pub confidence: f64,
    /// Consecutive ticks the label had been present when it fired
    pub stable_ticks: u32,
    pub fired_at: DateTime<Utc>,
}

/// Per-label-space stability filter
#[derive(Debug, Clone)]
pub struct StabilityFilter<L: Ord + Clone> {
    default_policy: LabelPolicy,
    policies: BTreeMap<L, LabelPolicy>,
    states: BTreeMap<L, StabilityState>,
}

impl<L: Ord + Clone> StabilityFilter<L> {
    /// Create a filter where every label uses `default_policy`
    pub fn new(default_policy: LabelPolicy) -> Self {
        Self {
            default_policy,
            policies: BTreeMap::new(),
            states: BTreeMap::new(),
        }
    }

    /// Override the policy for one label
    pub fn with_policy(mut self, label: L, policy: LabelPolicy) -> Self {
        self.policies.insert(label, policy);
        self
    }

    pub fn policy(&self, label: &L) -> &LabelPolicy {
        self.policies.get(label).unwrap_or(&self.default_policy)
    }

    pub fn state(&self, label: &L) -> Option<&StabilityState> {
        self.states.get(label)
    }

    /// Forget all accumulated state
    pub fn reset(&mut self) {
        self.states.clear();
    }

    /// Apply one tick.
    ///
    /// `present` lists the labels observed this tick with their confidence. A
    /// label listed more than once counts once, at its highest confidence. A
    /// label below its policy's `detection_threshold` counts as absent.
    /// Returned signals are ordered by label.
    pub fn tick<I>(&mut self, present: I, now: DateTime<Utc>) -> Vec<QualifyingSignal<L>>
    where
        I: IntoIterator<Item = (L, f64)>,
    {
        let mut seen: BTreeMap<L, f64> = BTreeMap::new();
        for (label, confidence) in present {
            let best = seen.entry(label).or_insert(confidence);
            if confidence > *best {
                *best = confidence;
            }
        }
        seen.retain(|label, confidence| *confidence >= self.policy(label).detection_threshold);

        // Any miss resets the run; there is no partial decay.
        for (label, state) in self.states.iter_mut() {
            if !seen.contains_key(label) {
                state.consecutive_hit_count = 0;
            }
        }

        let mut fired = Vec::new();
        for (label, confidence) in seen {
            let policy = *self.policy(&label);
            let state = self.states.entry(label.clone()).or_default();
            state.consecutive_hit_count += 1;

            let stable = state.consecutive_hit_count >= policy.min_stable_ticks;
            let confident = confidence >= policy.detection_threshold;
            let cooled_down = match state.last_fired_at {
                Some(last) => now - last >= policy.cooldown(),
                None => true,
            };

            if stable && confident && cooled_down {
                fired.push(QualifyingSignal {
                    label,
                    confidence,
                    stable_ticks: state.consecutive_hit_count,
                    fired_at: now,
                });
                state.last_fired_at = Some(now);
                state.consecutive_hit_count = 0;
            }
        }

        fired
    }
}
