//! Transient alerts with independent expiry timers
//!
//! Every alert gets its own Tokio timer task that removes it when its TTL
//! elapses. There is no global sweep: alerts expire independently of each
//! other. Explicit removal aborts the timer, and removing an id that is
//! already gone is a no-op. Alerts are advisory and never touch session or
//! score state.

use crate::types::{Alert, AlertId, Severity};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Entry {
    alert: Alert,
    timer: JoinHandle<()>,
}

struct Inner {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<AlertId, Entry>>,
    updates: watch::Sender<Vec<Alert>>,
}

impl Inner {
    fn publish(&self, entries: &BTreeMap<AlertId, Entry>) {
        let alerts = entries.values().map(|e| e.alert.clone()).collect();
        self.updates.send_replace(alerts);
    }

    fn expire(&self, id: AlertId) {
        let mut entries = self.entries.lock();
        if entries.remove(&id).is_some() {
            tracing::debug!(alert_id = %id, "Alert expired");
            self.publish(&entries);
        }
    }
}

/// Scheduler owning the current alert set
#[derive(Clone)]
pub struct AlertScheduler {
    inner: Arc<Inner>,
}

impl Default for AlertScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlertScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertScheduler")
            .field("active", &self.len())
            .finish()
    }
}

impl AlertScheduler {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(BTreeMap::new()),
                updates,
            }),
        }
    }

    /// Add an alert and schedule its removal after `ttl_ms`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push(&self, severity: Severity, message: impl Into<String>, ttl_ms: u64) -> Alert {
        let id = AlertId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let alert = Alert {
            id,
            severity,
            message: message.into(),
            created_at: Utc::now(),
            ttl_ms,
        };

        let mut entries = self.inner.entries.lock();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ttl_ms)).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id);
            }
        });
        entries.insert(
            id,
            Entry {
                alert: alert.clone(),
                timer,
            },
        );
        self.inner.publish(&entries);

        tracing::debug!(alert_id = %id, severity = ?severity, ttl_ms, "Alert raised");
        alert
    }

    /// Remove an alert before its TTL; unknown ids are ignored
    pub fn remove(&self, id: AlertId) -> Option<Alert> {
        let mut entries = self.inner.entries.lock();
        let entry = entries.remove(&id)?;
        entry.timer.abort();
        self.inner.publish(&entries);
        Some(entry.alert)
    }

    /// Drop every alert and cancel every pending timer
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        if entries.is_empty() {
            return;
        }
        for (_, entry) in std::mem::take(&mut *entries) {
            entry.timer.abort();
        }
        self.inner.publish(&entries);
    }

    /// Current alerts, oldest first
    pub fn current(&self) -> Vec<Alert> {
        self.inner
            .entries
            .lock()
            .values()
            .map(|e| e.alert.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the alert set; the receiver sees every insertion and removal
    pub fn subscribe(&self) -> watch::Receiver<Vec<Alert>> {
        self.inner.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_expire_independently() {
        let scheduler = AlertScheduler::new();
        let short = scheduler.push(Severity::Warning, "looking away", 3_000);
        let long = scheduler.push(Severity::Error, "phone", 5_000);
        assert_eq!(scheduler.len(), 2);

        advance(3_500).await;
        let ids: Vec<AlertId> = scheduler.current().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![long.id]);
        assert!(ids.iter().all(|id| *id != short.id));

        advance(2_000).await;
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent() {
        let scheduler = AlertScheduler::new();
        let alert = scheduler.push(Severity::Info, "hello", 10_000);

        assert_eq!(scheduler.remove(alert.id).map(|a| a.id), Some(alert.id));
        assert!(scheduler.remove(alert.id).is_none());
        assert!(scheduler.remove(AlertId(999)).is_none());

        // The aborted timer must not disturb later alerts.
        let other = scheduler.push(Severity::Info, "world", 20_000);
        advance(11_000).await;
        assert_eq!(scheduler.current()[0].id, other.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_timers() {
        let scheduler = AlertScheduler::new();
        let mut rx = scheduler.subscribe();
        scheduler.push(Severity::Warning, "a", 3_000);
        scheduler.push(Severity::Error, "b", 5_000);

        scheduler.clear();
        assert!(scheduler.is_empty());
        assert!(rx.borrow_and_update().is_empty());

        advance(10_000).await;
        assert!(!rx.has_changed().unwrap());
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_interleaves_with_insertions() {
        let scheduler = AlertScheduler::new();
        for i in 0..10u64 {
            scheduler.push(Severity::Info, format!("alert {}", i), 1_000 + i * 100);
            advance(150).await;
        }
        // Everything pushed more than its TTL ago is gone; the rest remain.
        let remaining = scheduler.current();
        assert!(!remaining.is_empty());
        assert!(remaining.len() < 10);
        advance(5_000).await;
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let scheduler = AlertScheduler::new();
        let mut rx = scheduler.subscribe();

        let alert = scheduler.push(Severity::Warning, "book detected", 1_000);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].id, alert.id);

        advance(1_500).await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }
}
