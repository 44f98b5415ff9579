//! Restore-on-wake background worker.
//!
//! The worker owns a pending cache and a set of per-task timers. It is driven
//! by [`WorkerCommand`]s over an mpsc channel; each command that needs an
//! answer carries a oneshot reply. On activation, and again on every periodic
//! sync tick, it re-arms timers for whatever sits in its cache.

use super::cache::PendingCache;
use super::timers::TimerSet;
use beacon_core::{
    notification::{PendingNotification, PushPayload},
    time::Clock,
    traits::Notifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Control messages accepted by the worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Replace any timer for the task; deliver now if due, else cache and arm.
    Schedule {
        notification: PendingNotification,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Deliver right away.
    Immediate {
        payload: PushPayload,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Cancel {
        task_id: String,
    },
    CancelAll,
    List {
        reply: oneshot::Sender<Vec<PendingNotification>>,
    },
    Wake,
    /// Stop the loop. Armed timers are dropped; the cache is kept.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Restoring,
    Active,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Restoring => "restoring",
            Self::Active => "active",
        }
    }
}

/// What came back from a request to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Confirmed,
    Failed(String),
    /// No worker is running (channel closed).
    Unavailable,
}

/// Cheap, cloneable sender side.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerCommand>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub async fn schedule(&self, notification: PendingNotification, timeout: Duration) -> WorkerReply {
        let (reply, rx) = oneshot::channel();
        self.request(WorkerCommand::Schedule { notification, reply }, rx, timeout)
            .await
    }

    pub async fn immediate(&self, payload: PushPayload, timeout: Duration) -> WorkerReply {
        let (reply, rx) = oneshot::channel();
        self.request(WorkerCommand::Immediate { payload, reply }, rx, timeout)
            .await
    }

    pub async fn cancel(&self, task_id: &str) {
        let cmd = WorkerCommand::Cancel {
            task_id: task_id.to_string(),
        };
        if self.tx.send(cmd).await.is_err() {
            debug!("worker gone, cancel {task_id} dropped");
        }
    }

    pub async fn cancel_all(&self) {
        if self.tx.send(WorkerCommand::CancelAll).await.is_err() {
            debug!("worker gone, cancel-all dropped");
        }
    }

    /// The worker's cached records. `None` if it is gone or too slow.
    pub async fn list(&self, timeout: Duration) -> Option<Vec<PendingNotification>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(WorkerCommand::List { reply }).await.ok()?;
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(WorkerCommand::Shutdown).await;
    }

    /// Nudge the worker. Never blocks; a full queue already means it is awake.
    pub fn wake(&self) {
        let _ = self.tx.try_send(WorkerCommand::Wake);
    }

    async fn request(
        &self,
        cmd: WorkerCommand,
        rx: oneshot::Receiver<Result<(), String>>,
        timeout: Duration,
    ) -> WorkerReply {
        if self.tx.send(cmd).await.is_err() {
            return WorkerReply::Unavailable;
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(()))) => WorkerReply::Confirmed,
            Ok(Ok(Err(e))) => WorkerReply::Failed(e),
            Ok(Err(_)) => WorkerReply::Unavailable,
            Err(_) => WorkerReply::Failed(format!(
                "worker did not confirm within {}ms",
                timeout.as_millis()
            )),
        }
    }
}

pub struct Worker {
    cache: PendingCache,
    timers: TimerSet,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    sync_interval: Duration,
    state: watch::Sender<WorkerState>,
    restored: bool,
}

impl Worker {
    pub fn new(
        cache: PendingCache,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        sync_interval: Duration,
    ) -> Self {
        Self {
            cache,
            timers: TimerSet::new(),
            notifier,
            clock,
            sync_interval,
            state: watch::Sender::new(WorkerState::Uninitialized),
            restored: false,
        }
    }

    /// Start the worker loop. Dropping every handle stops it.
    pub fn spawn(self) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let state = self.state.subscribe();
        let join = tokio::spawn(self.run(rx));
        (WorkerHandle { tx, state }, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<WorkerCommand>) {
        self.activate().await;

        let mut sync = tokio::time::interval(self.sync_interval);
        sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; activation already scanned.
        sync.tick().await;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if matches!(cmd, WorkerCommand::Shutdown) {
                        break;
                    }
                    self.ensure_restored().await;
                    self.handle(cmd).await;
                }
                _ = sync.tick() => {
                    debug!("worker: periodic sync");
                    self.restore(true).await;
                }
            }
        }

        let aborted = self.timers.cancel_all();
        self.state.send_replace(WorkerState::Uninitialized);
        info!("worker stopped ({aborted} timer(s) dropped, cache kept)");
    }

    async fn activate(&mut self) {
        self.state.send_replace(WorkerState::Restoring);
        self.restored = false;
        self.restore(false).await;
        self.state.send_replace(WorkerState::Active);
        info!("worker active, {} timer(s) armed", self.timers.len());
    }

    async fn ensure_restored(&mut self) {
        if !self.restored {
            self.restore(false).await;
        }
    }

    /// Re-arm from the cache. Overdue records are delivered and purged; tasks
    /// that already have a timer are left alone.
    async fn restore(&mut self, force: bool) {
        if self.restored && !force {
            return;
        }
        let now = self.clock.now();
        let mut armed = 0;
        for record in self.cache.list().await {
            if self.timers.contains(&record.task_id) {
                continue;
            }
            if record.scheduled_time <= now {
                info!("worker: {} overdue, delivering now", record.task_id);
                self.deliver(&record.payload()).await;
                self.cache.remove(&record.task_id).await;
            } else {
                self.arm(record);
                armed += 1;
            }
        }
        if armed > 0 {
            debug!("worker: restored {armed} timer(s)");
        }
        self.restored = true;
    }

    async fn handle(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::Schedule {
                notification,
                reply,
            } => {
                let result = self.schedule(notification).await;
                let _ = reply.send(result);
            }
            WorkerCommand::Immediate { payload, reply } => {
                let result = self
                    .notifier
                    .notify(&payload)
                    .await
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            WorkerCommand::Cancel { task_id } => {
                let had_timer = self.timers.cancel(&task_id);
                self.cache.remove(&task_id).await;
                debug!("worker: cancel {task_id} (timer armed: {had_timer})");
            }
            WorkerCommand::CancelAll => {
                let n = self.timers.cancel_all();
                self.cache.clear().await;
                info!("worker: cancelled {n} timer(s)");
            }
            WorkerCommand::List { reply } => {
                let _ = reply.send(self.cache.list().await);
            }
            WorkerCommand::Wake => {
                debug!("worker: wake");
            }
            WorkerCommand::Shutdown => {}
        }
    }

    async fn schedule(&mut self, record: PendingNotification) -> Result<(), String> {
        self.timers.cancel(&record.task_id);

        if record.scheduled_time <= self.clock.now() {
            self.cache.remove(&record.task_id).await;
            return self
                .notifier
                .notify(&record.payload())
                .await
                .map_err(|e| e.to_string());
        }

        if !self.cache.put(record.clone()).await {
            return Err("worker cache unavailable".to_string());
        }
        info!(
            "worker: {} armed for {}",
            record.task_id,
            beacon_core::time::format_iso(record.scheduled_time)
        );
        self.arm(record);
        Ok(())
    }

    fn arm(&self, record: PendingNotification) {
        let delay = (record.scheduled_time - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let notifier = Arc::clone(&self.notifier);
        let cache = self.cache.clone();
        let task_id = record.task_id.clone();
        self.timers.arm(&task_id, delay, async move {
            if let Err(e) = notifier.notify(&record.payload()).await {
                warn!("worker: delivery of {} failed: {e}", record.task_id);
            }
            cache.remove(&record.task_id).await;
        });
    }

    async fn deliver(&self, payload: &PushPayload) {
        if let Err(e) = self.notifier.notify(payload).await {
            warn!(
                "worker: delivery of {} failed: {e}",
                payload.tag.as_deref().unwrap_or("-")
            );
        }
    }
}
