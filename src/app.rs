//! Wiring: store, push service, worker, and the dispatcher's tier chain.

use crate::bridge::NotificationBridge;
use crate::dispatcher::tiers::{DeliveryTier, LocalTimerTier, PushTier, WorkerTier};
use crate::dispatcher::Dispatcher;
use crate::executor::cache::PendingCache;
use crate::executor::worker::{Worker, WorkerHandle};
use beacon_core::{
    config::{shellexpand, Config, StoreBackend},
    error::BeaconError,
    time::{Clock, SystemClock},
    traits::Notifier,
};
use beacon_push::{build_provider, PushService};
use beacon_store::{open_backend, FileBackend, KvBackend, MemoryBackend, ScheduleStore, SubscriptionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything a command needs, built once from config.
pub struct App {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
    pub bridge: NotificationBridge,
    pub worker: Option<WorkerHandle>,
    pub worker_task: Option<JoinHandle<()>>,
}

impl App {
    /// Build the full stack. `with_worker` starts the background worker (serve only).
    pub async fn build(config: Config, with_worker: bool) -> Result<Self, BeaconError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let tz = config.scheduler.tz()?;

        let backend = open_backend(&config.store).await?;
        let store = ScheduleStore::new(Arc::clone(&backend));
        let registry = SubscriptionRegistry::new(backend);

        let provider = build_provider(&config.push)?;
        let push = PushService::new(provider, registry, config.push.vapid_public_key.clone());

        let bridge = NotificationBridge::new();
        let notifier: Arc<dyn Notifier> = Arc::new(bridge.clone());

        let (worker, worker_task) = if with_worker && config.worker.enabled {
            let cache = PendingCache::new(worker_cache_backend(&config));
            let w = Worker::new(
                cache,
                Arc::clone(&notifier),
                Arc::clone(&clock),
                Duration::from_secs(config.worker.sync_interval_secs.max(1)),
            );
            let (handle, task) = w.spawn();
            (Some(handle), Some(task))
        } else {
            (None, None)
        };

        let tiers: Vec<Arc<dyn DeliveryTier>> = vec![
            Arc::new(PushTier::new(store.clone(), push.clone())),
            Arc::new(WorkerTier::new(
                worker.clone(),
                Duration::from_millis(config.worker.confirm_timeout_ms),
            )),
            Arc::new(LocalTimerTier::new(notifier, Arc::clone(&clock))),
        ];

        let dispatcher = Dispatcher::new(
            tiers,
            store,
            push,
            clock,
            tz,
            config.scheduler.default_body.clone(),
        );
        info!(
            "dispatcher ready | tiers: {} | push: {} | tz: {}",
            dispatcher.tier_names().join(" > "),
            dispatcher.push().provider_name(),
            tz
        );

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            bridge,
            worker,
            worker_task,
        })
    }
}

/// The worker's cache follows the store's durability: in-memory store, in-memory cache.
fn worker_cache_backend(config: &Config) -> Arc<dyn KvBackend> {
    match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryBackend::new()),
        StoreBackend::File | StoreBackend::Sqlite => {
            Arc::new(FileBackend::new(shellexpand(&config.worker.cache_dir)))
        }
    }
}
