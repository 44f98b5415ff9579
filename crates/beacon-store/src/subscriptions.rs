//! Durable mapping endpoint → push credentials.

use crate::backend::KvBackend;
use crate::collection::Collection;
use beacon_core::notification::PushSubscription;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collection key for registered subscriptions.
pub const SUBSCRIPTIONS_KEY: &str = "subscriptions";

/// Registered delivery targets, deduplicated on endpoint.
///
/// Same failure posture as [`crate::ScheduleStore`].
#[derive(Clone)]
pub struct SubscriptionRegistry {
    items: Collection<PushSubscription>,
}

impl SubscriptionRegistry {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            items: Collection::new(backend, SUBSCRIPTIONS_KEY),
        }
    }

    pub async fn list(&self) -> Vec<PushSubscription> {
        match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("subscription registry: list failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn find(&self, endpoint: &str) -> Option<PushSubscription> {
        self.list().await.into_iter().find(|s| s.endpoint == endpoint)
    }

    /// Register a subscription. An already-known endpoint is left untouched.
    pub async fn upsert(&self, subscription: PushSubscription) -> bool {
        let _writing = self.items.lock().await;
        let mut items = match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("subscription registry: upsert skipped: {e}");
                return false;
            }
        };
        if items.iter().any(|s| s.endpoint == subscription.endpoint) {
            debug!("subscription registry: {} already registered", subscription.endpoint);
            return true;
        }
        let endpoint = subscription.endpoint.clone();
        items.push(subscription);
        match self.items.save(&items).await {
            Ok(()) => {
                info!("subscription registered: {endpoint}");
                true
            }
            Err(e) => {
                warn!("subscription registry: upsert {endpoint} not persisted: {e}");
                false
            }
        }
    }

    pub async fn remove(&self, endpoint: &str) -> bool {
        let _writing = self.items.lock().await;
        let mut items = match self.items.load().await {
            Ok(items) => items,
            Err(e) => {
                warn!("subscription registry: remove skipped: {e}");
                return false;
            }
        };
        let before = items.len();
        items.retain(|s| s.endpoint != endpoint);
        if items.len() == before {
            return true;
        }
        match self.items.save(&items).await {
            Ok(()) => {
                info!("subscription removed: {endpoint}");
                true
            }
            Err(e) => {
                warn!("subscription registry: remove {endpoint} not persisted: {e}");
                false
            }
        }
    }
}
