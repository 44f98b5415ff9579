//! The background worker's own pending cache.
//!
//! Separate from the schedule store: it only holds what this worker armed,
//! keyed by task id, so timers can be restored after a restart.

use beacon_core::notification::PendingNotification;
use beacon_store::KvBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

const PENDING_KEY: &str = "pending";

type PendingMap = BTreeMap<String, PendingNotification>;

#[derive(Clone)]
pub struct PendingCache {
    backend: Arc<dyn KvBackend>,
}

impl PendingCache {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// All cached records, ordered by task id. Unreadable cache = empty.
    pub async fn list(&self) -> Vec<PendingNotification> {
        self.load().await.map(|m| m.into_values().collect()).unwrap_or_default()
    }

    pub async fn put(&self, record: PendingNotification) -> bool {
        let Some(mut map) = self.load().await else {
            return false;
        };
        map.insert(record.task_id.clone(), record);
        self.save(&map).await
    }

    pub async fn remove(&self, task_id: &str) -> bool {
        let Some(mut map) = self.load().await else {
            return false;
        };
        if map.remove(task_id).is_none() {
            return true;
        }
        self.save(&map).await
    }

    pub async fn clear(&self) -> bool {
        self.save(&PendingMap::new()).await
    }

    async fn load(&self) -> Option<PendingMap> {
        match self.backend.get(PENDING_KEY).await {
            Ok(None) => Some(PendingMap::new()),
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!("worker cache unreadable, starting empty: {e}");
                    Some(PendingMap::new())
                }
            },
            Err(e) => {
                warn!("worker cache: {e}");
                None
            }
        }
    }

    async fn save(&self, map: &PendingMap) -> bool {
        let raw = match serde_json::to_string_pretty(map) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("worker cache: encode failed: {e}");
                return false;
            }
        };
        match self.backend.put(PENDING_KEY, &raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!("worker cache: write failed: {e}");
                false
            }
        }
    }
}
