//! In-process notification bridge.
//!
//! Timers and the background worker publish fired notifications here; any
//! number of listeners (the serve-mode log sink, tests) subscribe to them.
//! A [`BridgeSubscription`] unsubscribes when dropped.

use async_trait::async_trait;
use beacon_core::{error::BeaconError, notification::PushPayload, traits::Notifier};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// A notification that fired locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub payload: PushPayload,
    pub fired_at: DateTime<Utc>,
}

type Listener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

/// Fan-out point between local delivery and whoever displays notifications.
#[derive(Clone, Default)]
pub struct NotificationBridge {
    inner: Arc<Listeners>,
}

impl NotificationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Keep the returned handle alive for as long as
    /// events should be received.
    pub fn subscribe<F>(&self, listener: F) -> BridgeSubscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        BridgeSubscription {
            id,
            bridge: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current listener. Returns how many saw it.
    pub fn publish(&self, event: &NotificationEvent) -> usize {
        // Snapshot so a listener may subscribe or unsubscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl Notifier for NotificationBridge {
    async fn notify(&self, payload: &PushPayload) -> Result<(), BeaconError> {
        let event = NotificationEvent {
            payload: payload.clone(),
            fired_at: Utc::now(),
        };
        let seen = self.publish(&event);
        debug!(
            "bridge: published tag={} to {seen} listener(s)",
            payload.tag.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}

/// Live registration on a [`NotificationBridge`].
pub struct BridgeSubscription {
    id: u64,
    bridge: Weak<Listeners>,
}

impl BridgeSubscription {
    /// Stop receiving events now.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for BridgeSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bridge.upgrade() {
            inner
                .entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}
