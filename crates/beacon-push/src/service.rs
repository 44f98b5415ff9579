use beacon_core::{
    notification::{PushPayload, PushSubscription},
    traits::PushProvider,
};
use beacon_store::SubscriptionRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends payloads through a [`PushProvider`] and keeps the registry clean.
#[derive(Clone)]
pub struct PushService {
    provider: Arc<dyn PushProvider>,
    registry: SubscriptionRegistry,
    public_key: String,
}

impl PushService {
    pub fn new(
        provider: Arc<dyn PushProvider>,
        registry: SubscriptionRegistry,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            public_key: public_key.into(),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Application-server key handed to clients when they subscribe.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Deliver to one subscription. Never fails.
    ///
    /// A permanently rejected subscription (404/410) is removed from the
    /// registry; any other failure leaves it in place.
    pub async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> bool {
        match self.provider.send(subscription, payload).await {
            Ok(()) => {
                info!(
                    "push sent via {}: tag={} endpoint={}",
                    self.provider.name(),
                    payload.tag.as_deref().unwrap_or("-"),
                    subscription.endpoint
                );
                true
            }
            Err(e) if e.is_permanent() => {
                warn!("push: {e}, removing {}", subscription.endpoint);
                self.registry.remove(&subscription.endpoint).await;
                false
            }
            Err(e) => {
                warn!("push to {} failed: {e}", subscription.endpoint);
                false
            }
        }
    }

    /// Deliver to every subscription in turn. Returns the number of successful sends.
    pub async fn broadcast(&self, subscriptions: &[PushSubscription], payload: &PushPayload) -> usize {
        let mut sent = 0;
        for subscription in subscriptions {
            if self.send(subscription, payload).await {
                sent += 1;
            }
        }
        sent
    }

    /// Deliver to the subscription registered at `endpoint`, or broadcast to
    /// all of `subscriptions` when it is empty or no longer registered.
    /// Returns the number of successful sends.
    pub async fn deliver(
        &self,
        subscriptions: &[PushSubscription],
        endpoint: &str,
        payload: &PushPayload,
    ) -> usize {
        let bound = subscriptions
            .iter()
            .find(|s| !endpoint.is_empty() && s.endpoint == endpoint);
        match bound {
            Some(subscription) => usize::from(self.send(subscription, payload).await),
            None => {
                if !endpoint.is_empty() {
                    debug!("push: {endpoint} is not registered, broadcasting");
                }
                self.broadcast(subscriptions, payload).await
            }
        }
    }
}
