use crate::{
    error::{BeaconError, DeliveryError},
    notification::{PushPayload, PushSubscription},
};
use async_trait::async_trait;

/// Push provider trait: the outbound wire.
///
/// Every push backend (an HTTP relay that performs the VAPID handshake and
/// payload encryption, a test double, etc.) implements this trait so the
/// dispatcher can address a subscription without knowing the transport.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Deliver one payload to one subscription.
    ///
    /// Returns [`DeliveryError::Gone`] when the provider reports the
    /// subscription no longer exists.
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError>;
}

/// Local display sink: where a background worker or in-process timer puts a
/// notification once it fires.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show (or hand off) a notification.
    async fn notify(&self, payload: &PushPayload) -> Result<(), BeaconError>;
}
