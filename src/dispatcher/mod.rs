//! Notification dispatcher.
//!
//! Turns a scheduling intent into a fire time, then walks the delivery
//! fallback chain until one tier takes it. The sweep over the durable store
//! lives in `sweep`.

mod sweep;
pub mod tiers;


use beacon_core::{
    error::{BeaconError, DeliveryError},
    notification::{ScheduleRequest, ScheduledNotification},
    time::{self, Clock, FirePlan},
};
use beacon_push::PushService;
use beacon_store::ScheduleStore;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tiers::{Attempt, DeliveryTier};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a scheduled reminder ended up being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// The reminder window was already open; shown right away.
    Immediate,
    /// Held by a tier until its fire time.
    Deferred,
}

/// Outcome of a successful [`Dispatcher::try_schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub id: String,
    pub task_id: String,
    pub fire_at: DateTime<Utc>,
    pub handling: Handling,
    /// Name of the tier that accepted it.
    pub tier: String,
}

pub struct Dispatcher {
    tiers: Vec<Arc<dyn DeliveryTier>>,
    store: ScheduleStore,
    push: PushService,
    clock: Arc<dyn Clock>,
    tz: Tz,
    default_body: String,
    /// One sweep at a time, so no due record is pushed twice.
    sweep_lock: Mutex<()>,
}

impl Dispatcher {
    /// `tiers` are tried in order; put the most durable first.
    pub fn new(
        tiers: Vec<Arc<dyn DeliveryTier>>,
        store: ScheduleStore,
        push: PushService,
        clock: Arc<dyn Clock>,
        tz: Tz,
        default_body: impl Into<String>,
    ) -> Self {
        Self {
            tiers,
            store,
            push,
            clock,
            tz,
            default_body: default_body.into(),
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn push(&self) -> &PushService {
        &self.push
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Validate `req` and compute its record and fire plan at the current time.
    pub fn build_schedule(
        &self,
        req: &ScheduleRequest,
    ) -> Result<(ScheduledNotification, FirePlan), BeaconError> {
        req.validate()?;
        let now = self.clock.now();
        let event = time::event_time(&req.scheduled_date, &req.scheduled_time, self.tz)?;
        let plan = time::plan(event, req.reminder_minutes(), now)?;
        let record = ScheduledNotification::new(
            req.task_id.trim(),
            &req.title,
            &req.body_or(&self.default_body),
            plan.fire_at(),
            req.endpoint(),
            now,
        );
        Ok((record, plan))
    }

    /// Write straight to the durable store, whatever the fire plan. An
    /// already-open window is picked up by the next sweep.
    pub async fn persist_schedule(
        &self,
        req: &ScheduleRequest,
    ) -> Result<ScheduledNotification, BeaconError> {
        let (record, _) = self.build_schedule(req)?;
        if !self.store.upsert_by_task(record.clone()).await {
            return Err(BeaconError::StoreUnavailable(format!(
                "could not persist schedule for {}",
                record.task_id
            )));
        }
        info!(
            "schedule {} persisted for {}",
            record.task_id,
            time::format_iso(record.scheduled_time)
        );
        Ok(record)
    }

    /// Schedule a reminder through the fallback chain.
    ///
    /// Any existing schedule for the same task is cancelled in every tier
    /// first. Only validation and past-event errors, or every tier refusing,
    /// come back as `Err`.
    pub async fn try_schedule(&self, req: &ScheduleRequest) -> Result<Scheduled, BeaconError> {
        let (record, plan) = self.build_schedule(req)?;
        self.cancel_notification(&record.task_id).await;

        let (handling, tier) = match plan {
            FirePlan::Immediate(_) => {
                info!("{}: reminder window already open, delivering now", record.task_id);
                let tier = self.deliver_now(&record).await?;
                (Handling::Immediate, tier)
            }
            FirePlan::Deferred(at) => {
                let tier = self.defer(&record).await?;
                info!(
                    "{}: scheduled for {} via {tier} tier",
                    record.task_id,
                    time::format_iso(at)
                );
                (Handling::Deferred, tier)
            }
        };

        Ok(Scheduled {
            id: record.id,
            task_id: record.task_id,
            fire_at: plan.fire_at(),
            handling,
            tier,
        })
    }

    /// [`Self::try_schedule`] for callers that only care whether it worked.
    pub async fn schedule_notification(&self, req: &ScheduleRequest) -> Option<String> {
        match self.try_schedule(req).await {
            Ok(scheduled) => Some(scheduled.id),
            Err(BeaconError::EventAlreadyPassed) => {
                warn!("{}: event time has already passed", req.task_id);
                None
            }
            Err(e) => {
                warn!("{}: not scheduled: {e}", req.task_id);
                None
            }
        }
    }

    /// Show a schedule now through the first tier able to.
    pub async fn deliver_now(&self, schedule: &ScheduledNotification) -> Result<String, BeaconError> {
        for tier in &self.tiers {
            match tier.deliver_now(schedule).await {
                Attempt::Delivered => return Ok(tier.name().to_string()),
                Attempt::Unavailable => debug!("{} tier cannot deliver now", tier.name()),
                Attempt::Failed(e) => warn!("{} tier failed immediate delivery: {e}", tier.name()),
            }
        }
        Err(DeliveryError::Transient(format!(
            "no tier could deliver {} now",
            schedule.task_id
        ))
        .into())
    }

    async fn defer(&self, record: &ScheduledNotification) -> Result<String, BeaconError> {
        for tier in &self.tiers {
            match tier.attempt(record).await {
                Attempt::Delivered => return Ok(tier.name().to_string()),
                Attempt::Unavailable => debug!("{} tier unavailable", tier.name()),
                Attempt::Failed(e) => {
                    warn!("{} tier refused {}: {e}, falling back", tier.name(), record.task_id)
                }
            }
        }
        Err(DeliveryError::Transient(format!("no tier accepted {}", record.task_id)).into())
    }

    /// Cancel a task's reminder in every tier. Idempotent.
    pub async fn cancel_notification(&self, task_id: &str) {
        for tier in &self.tiers {
            tier.cancel(task_id).await;
        }
        debug!("{task_id}: cancelled in all tiers");
    }

    /// Cancel every reminder held by this process's tiers.
    pub async fn cancel_all_notifications(&self) {
        for tier in &self.tiers {
            tier.cancel_all().await;
        }
        info!("all local reminders cancelled");
    }

    /// Fire a test notification through the immediate path.
    pub async fn test_notification(&self) -> Result<String, BeaconError> {
        let now = self.clock.now();
        let check = ScheduledNotification::new(
            &format!("test-{}", Uuid::new_v4()),
            "Test notification",
            "Notifications are working.",
            now,
            None,
            now,
        );
        self.deliver_now(&check).await
    }
}
