//! Delivery tiers, strongest guarantee first.
//!
//! - `PushTier`: persist to the schedule store for the sweep, or push right away
//! - `WorkerTier`: hand to the background worker and wait for confirmation
//! - `LocalTimerTier`: in-process timer that publishes on the bridge

use crate::executor::timers::TimerSet;
use crate::executor::worker::{WorkerHandle, WorkerReply};
use async_trait::async_trait;
use beacon_core::{
    notification::{PendingNotification, ScheduledNotification},
    time::Clock,
    traits::Notifier,
};
use beacon_push::PushService;
use beacon_store::ScheduleStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of offering a schedule (or an immediate payload) to one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered,
    /// The tier cannot take this kind of work right now; try the next one.
    Unavailable,
    Failed(String),
}

/// One rung of the fallback chain.
#[async_trait]
pub trait DeliveryTier: Send + Sync {
    fn name(&self) -> &str;

    /// Take ownership of a deferred schedule.
    async fn attempt(&self, schedule: &ScheduledNotification) -> Attempt;

    /// Show a schedule's payload right now.
    async fn deliver_now(&self, schedule: &ScheduledNotification) -> Attempt;

    /// Forget anything this tier holds for `task_id`. Idempotent.
    async fn cancel(&self, task_id: &str);

    async fn cancel_all(&self);
}

/// Durable tier: the schedule store, drained by the sweep. Immediate
/// reminders go straight out through the push service.
pub struct PushTier {
    store: ScheduleStore,
    push: PushService,
}

impl PushTier {
    pub fn new(store: ScheduleStore, push: PushService) -> Self {
        Self { store, push }
    }
}

#[async_trait]
impl DeliveryTier for PushTier {
    fn name(&self) -> &str {
        "push"
    }

    async fn attempt(&self, schedule: &ScheduledNotification) -> Attempt {
        if self.store.upsert_by_task(schedule.clone()).await {
            Attempt::Delivered
        } else {
            Attempt::Failed("schedule store unavailable".to_string())
        }
    }

    async fn deliver_now(&self, schedule: &ScheduledNotification) -> Attempt {
        let subscriptions = self.push.registry().list().await;
        if subscriptions.is_empty() {
            return Attempt::Unavailable;
        }
        let sent = self
            .push
            .deliver(&subscriptions, &schedule.subscription_endpoint, &schedule.payload())
            .await;
        if sent > 0 {
            Attempt::Delivered
        } else {
            Attempt::Failed(format!(
                "no subscription accepted {}",
                schedule.task_id
            ))
        }
    }

    async fn cancel(&self, task_id: &str) {
        self.store.remove_by_task(task_id).await;
    }

    async fn cancel_all(&self) {
        // The store is shared by every client; one client's cancel-all must not wipe it.
        debug!("push tier: cancel-all leaves the shared schedule store untouched");
    }
}

/// Background worker tier.
pub struct WorkerTier {
    handle: Option<WorkerHandle>,
    confirm_timeout: Duration,
}

impl WorkerTier {
    pub fn new(handle: Option<WorkerHandle>, confirm_timeout: Duration) -> Self {
        Self {
            handle,
            confirm_timeout,
        }
    }

    fn running(&self) -> Option<&WorkerHandle> {
        self.handle.as_ref().filter(|h| h.is_running())
    }
}

fn from_reply(reply: WorkerReply) -> Attempt {
    match reply {
        WorkerReply::Confirmed => Attempt::Delivered,
        WorkerReply::Failed(e) => Attempt::Failed(e),
        WorkerReply::Unavailable => Attempt::Unavailable,
    }
}

#[async_trait]
impl DeliveryTier for WorkerTier {
    fn name(&self) -> &str {
        "worker"
    }

    async fn attempt(&self, schedule: &ScheduledNotification) -> Attempt {
        let Some(handle) = self.running() else {
            return Attempt::Unavailable;
        };
        from_reply(
            handle
                .schedule(PendingNotification::from(schedule), self.confirm_timeout)
                .await,
        )
    }

    async fn deliver_now(&self, schedule: &ScheduledNotification) -> Attempt {
        let Some(handle) = self.running() else {
            return Attempt::Unavailable;
        };
        from_reply(handle.immediate(schedule.payload(), self.confirm_timeout).await)
    }

    async fn cancel(&self, task_id: &str) {
        if let Some(handle) = self.running() {
            handle.cancel(task_id).await;
        }
    }

    async fn cancel_all(&self) {
        if let Some(handle) = self.running() {
            handle.cancel_all().await;
        }
    }
}

/// Last resort: an in-process timer. Lost if the process exits.
pub struct LocalTimerTier {
    timers: TimerSet,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl LocalTimerTier {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            timers: TimerSet::new(),
            notifier,
            clock,
        }
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }
}

#[async_trait]
impl DeliveryTier for LocalTimerTier {
    fn name(&self) -> &str {
        "local"
    }

    async fn attempt(&self, schedule: &ScheduledNotification) -> Attempt {
        let delay = (schedule.scheduled_time - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let notifier = Arc::clone(&self.notifier);
        let payload = schedule.payload();
        self.timers.arm(&schedule.task_id, delay, async move {
            if let Err(e) = notifier.notify(&payload).await {
                warn!(
                    "local timer: delivery of {} failed: {e}",
                    payload.tag.as_deref().unwrap_or("-")
                );
            }
        });
        Attempt::Delivered
    }

    async fn deliver_now(&self, schedule: &ScheduledNotification) -> Attempt {
        match self.notifier.notify(&schedule.payload()).await {
            Ok(()) => Attempt::Delivered,
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }

    async fn cancel(&self, task_id: &str) {
        self.timers.cancel(task_id);
    }

    async fn cancel_all(&self) {
        self.timers.cancel_all();
    }
}
