//! Durable mapping taskId → pending notification.

use crate::backend::KvBackend;
use crate::collection::Collection;
use beacon_core::notification::ScheduledNotification;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collection key for pending schedules.
pub const SCHEDULES_KEY: &str = "schedules";

/// Persisted pending notifications.
///
/// Every operation re-reads the whole collection and writes it back. Backend
/// failures are logged and swallowed: `list` yields nothing and mutations
/// report `false`.
#[derive(Clone)]
pub struct ScheduleStore {
    items: Collection<ScheduledNotification>,
}

impl ScheduleStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            items: Collection::new(backend, SCHEDULES_KEY),
        }
    }

    /// All pending records, in store order.
    pub async fn list(&self) -> Vec<ScheduledNotification> {
        match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("schedule store: list failed: {e}");
                Vec::new()
            }
        }
    }

    /// Replace any record for the same task, then append. Returns whether the write landed.
    pub async fn upsert_by_task(&self, record: ScheduledNotification) -> bool {
        let _writing = self.items.lock().await;
        let mut items = match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("schedule store: upsert {} skipped: {e}", record.task_id);
                return false;
            }
        };
        items.retain(|n| n.task_id != record.task_id);
        let task_id = record.task_id.clone();
        items.push(record);
        self.save(&items, "upsert", &task_id).await
    }

    /// Drop every record for `task_id`. Absent task = success without a write.
    pub async fn remove_by_task(&self, task_id: &str) -> bool {
        self.remove_where("remove_by_task", task_id, |n| n.task_id == task_id)
            .await
    }

    pub async fn remove_by_id(&self, id: &str) -> bool {
        self.remove_where("remove_by_id", id, |n| n.id == id).await
    }

    /// Drop all records whose id is in `ids`, in one read-modify-write.
    pub async fn remove_by_ids(&self, ids: &[String]) -> bool {
        if ids.is_empty() {
            return true;
        }
        self.remove_where("remove_by_ids", &ids.join(","), |n| ids.contains(&n.id))
            .await
    }

    async fn remove_where<F>(&self, op: &str, what: &str, matches: F) -> bool
    where
        F: Fn(&ScheduledNotification) -> bool,
    {
        let _writing = self.items.lock().await;
        let mut items = match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("schedule store: {op} {what} skipped: {e}");
                return false;
            }
        };
        let before = items.len();
        items.retain(|n| !matches(n));
        if items.len() == before {
            debug!("schedule store: {op} {what}: nothing to remove");
            return true;
        }
        self.save(&items, op, what).await
    }

    async fn save(&self, items: &[ScheduledNotification], op: &str, what: &str) -> bool {
        match self.items.save(items).await {
            Ok(()) => {
                debug!(
                    "schedule store: {op} {what} ok ({} pending in {})",
                    items.len(),
                    self.items.key()
                );
                true
            }
            Err(e) => {
                warn!("schedule store: {op} {what} not persisted: {e}");
                false
            }
        }
    }
}
