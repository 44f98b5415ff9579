//! Test doubles and a wired-up dispatcher shared by the binary's test modules.

use crate::dispatcher::tiers::{DeliveryTier, LocalTimerTier, PushTier, WorkerTier};
use crate::dispatcher::Dispatcher;
use crate::executor::cache::PendingCache;
use crate::executor::worker::{Worker, WorkerHandle};
use async_trait::async_trait;
use beacon_core::{
    error::{BeaconError, DeliveryError},
    notification::{PushPayload, PushSubscription, ScheduleRequest, SubscriptionKeys},
    time::{Clock, ManualClock},
    traits::{Notifier, PushProvider},
};
use beacon_push::PushService;
use beacon_store::{KvBackend, MemoryBackend, ScheduleStore, SubscriptionRegistry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WORKER_TIMEOUT: Duration = Duration::from_secs(2);

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn sub(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        keys: SubscriptionKeys {
            p256dh: "p256dh-key".to_string(),
            auth: "auth-secret".to_string(),
        },
    }
}

/// Reminder request for an event in UTC.
pub fn request(task_id: &str, date: &str, time: &str, reminder: i64) -> ScheduleRequest {
    ScheduleRequest {
        task_id: task_id.to_string(),
        title: format!("Task {task_id}"),
        body: None,
        scheduled_date: date.to_string(),
        scheduled_time: time.to_string(),
        reminder_minutes: Some(reminder),
        subscription_endpoint: None,
    }
}

/// Push provider double: records every send, fails on demand per endpoint.
#[derive(Default)]
pub struct RecordingProvider {
    failures: Mutex<HashMap<String, DeliveryError>>,
    calls: Mutex<Vec<(String, PushPayload)>>,
}

impl RecordingProvider {
    pub fn fail(&self, endpoint: &str, err: DeliveryError) {
        self.failures
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), err);
    }

    pub fn calls(&self) -> Vec<(String, PushPayload)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|(e, _)| e).collect()
    }
}

#[async_trait]
impl PushProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.clone()));
        match self.failures.lock().unwrap().get(&subscription.endpoint) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Notifier double: remembers what it was asked to show.
#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<PushPayload>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn shown(&self) -> Vec<PushPayload> {
        self.shown.lock().unwrap().clone()
    }

    /// Tags of everything shown, in order.
    pub fn tags(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|p| p.tag)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: &PushPayload) -> Result<(), BeaconError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BeaconError::Delivery(DeliveryError::Transient(
                "display refused".to_string(),
            )));
        }
        self.shown.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Push, worker and local tiers over `backend`, in that order.
fn wire(
    backend: Arc<dyn KvBackend>,
    provider: Arc<RecordingProvider>,
    worker: Option<WorkerHandle>,
    local: Arc<LocalTimerTier>,
    clock: Arc<dyn Clock>,
) -> Dispatcher {
    let store = ScheduleStore::new(Arc::clone(&backend));
    let registry = SubscriptionRegistry::new(backend);
    let push = PushService::new(provider, registry, "public-key");
    let tiers: Vec<Arc<dyn DeliveryTier>> = vec![
        Arc::new(PushTier::new(store.clone(), push.clone())),
        Arc::new(WorkerTier::new(worker, WORKER_TIMEOUT)),
        local,
    ];
    Dispatcher::new(
        tiers,
        store,
        push,
        clock,
        chrono_tz::Tz::UTC,
        "Starting soon: {time}",
    )
}

/// A dispatcher with no worker over an arbitrary backend, for store-level
/// behaviour such as file persistence. Returns the provider it sends through.
pub fn dispatcher_on(
    backend: Arc<dyn KvBackend>,
    now: &str,
) -> (Arc<Dispatcher>, Arc<RecordingProvider>) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(utc(now)));
    let provider = Arc::new(RecordingProvider::default());
    let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
    let local = Arc::new(LocalTimerTier::new(notifier, Arc::clone(&clock)));
    let dispatcher = wire(backend, provider.clone(), None, local, clock);
    (Arc::new(dispatcher), provider)
}

/// A dispatcher over an in-memory store, a manual clock, and recording doubles.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryBackend>,
    pub provider: Arc<RecordingProvider>,
    /// Receives local-timer and worker deliveries.
    pub notifier: Arc<RecordingNotifier>,
    pub local: Arc<LocalTimerTier>,
    pub worker: Option<WorkerHandle>,
}

impl Harness {
    /// Push and local tiers only; the worker tier is present but has no worker.
    pub fn new(now: &str) -> Self {
        Self::build(now, false)
    }

    /// All three tiers, with a running worker.
    pub fn with_worker(now: &str) -> Self {
        Self::build(now, true)
    }

    fn build(now: &str, with_worker: bool) -> Self {
        let clock = Arc::new(ManualClock::new(utc(now)));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let backend = Arc::new(MemoryBackend::new());
        let provider = Arc::new(RecordingProvider::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let dyn_notifier: Arc<dyn Notifier> = notifier.clone();

        let worker = if with_worker {
            let w = Worker::new(
                PendingCache::new(Arc::new(MemoryBackend::new())),
                Arc::clone(&dyn_notifier),
                Arc::clone(&dyn_clock),
                Duration::from_secs(300),
            );
            let (handle, _task) = w.spawn();
            Some(handle)
        } else {
            None
        };

        let local = Arc::new(LocalTimerTier::new(dyn_notifier, Arc::clone(&dyn_clock)));
        let dispatcher = wire(
            backend.clone(),
            provider.clone(),
            worker.clone(),
            local.clone(),
            dyn_clock,
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            clock,
            backend,
            provider,
            notifier,
            local,
            worker,
        }
    }

    pub async fn subscribe(&self, endpoint: &str) {
        assert!(
            self.dispatcher
                .push()
                .registry()
                .upsert(sub(endpoint))
                .await
        );
    }

    pub async fn pending_tasks(&self) -> Vec<String> {
        self.dispatcher
            .store()
            .list()
            .await
            .into_iter()
            .map(|n| n.task_id)
            .collect()
    }
}
