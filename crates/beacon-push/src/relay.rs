//! HTTP push relay provider.
//!
//! Beacon does not encrypt payloads itself. It POSTs the subscription, the
//! serialized payload, and its VAPID details to a relay (`{relay_url}/send`)
//! that speaks the Web Push protocol, and maps the relay's status back onto
//! [`DeliveryError`].

use async_trait::async_trait;
use beacon_core::{
    config::PushConfig,
    error::{BeaconError, DeliveryError},
    notification::{PushPayload, PushSubscription},
    traits::PushProvider,
};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// VAPID application-server identity forwarded to the relay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidDetails {
    pub subject: String,
    pub public_key: String,
    pub private_key: String,
}

/// Body of `POST {relay_url}/send`.
#[derive(Debug, Serialize)]
pub(crate) struct RelayRequest<'a> {
    pub subscription: &'a PushSubscription,
    /// The payload as a JSON string, exactly what the client's push handler parses.
    pub payload: String,
    pub vapid: &'a VapidDetails,
    pub ttl: u64,
}

/// Push provider backed by an HTTP relay.
pub struct RelayProvider {
    client: reqwest::Client,
    send_url: String,
    vapid: VapidDetails,
    ttl: u64,
}

impl RelayProvider {
    /// Build from `[push]`. Fails if the HTTP client cannot be constructed.
    pub fn from_config(config: &PushConfig) -> Result<Self, BeaconError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BeaconError::Config(format!("failed to build push client: {e}")))?;

        Ok(Self {
            client,
            send_url: format!("{}/send", config.relay_url.trim_end_matches('/')),
            vapid: VapidDetails {
                subject: config.vapid_subject.clone(),
                public_key: config.vapid_public_key.clone(),
                private_key: config.vapid_private_key.clone(),
            },
            ttl: config.ttl_secs,
        })
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    pub(crate) fn request<'a>(
        &'a self,
        subscription: &'a PushSubscription,
        payload: &PushPayload,
    ) -> Result<RelayRequest<'a>, DeliveryError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| DeliveryError::Transient(format!("payload encoding failed: {e}")))?;
        Ok(RelayRequest {
            subscription,
            payload,
            vapid: &self.vapid,
            ttl: self.ttl,
        })
    }
}

/// Map a relay response status onto a delivery outcome.
///
/// The relay forwards the push service's status: 404 and 410 mean the
/// subscription is gone for good.
pub fn classify_status(status: u16, body: &str) -> Result<(), DeliveryError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(DeliveryError::Gone(status)),
        _ => Err(DeliveryError::Transient(format!(
            "relay returned {status}: {body}"
        ))),
    }
}

#[async_trait]
impl PushProvider for RelayProvider {
    fn name(&self) -> &str {
        "relay"
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        let body = self.request(subscription, payload)?;
        debug!("relay: POST {} endpoint={}", self.send_url, subscription.endpoint);

        let resp = self
            .client
            .post(&self.send_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("relay request failed: {e}")))?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        classify_status(status, &text)
    }
}

/// Stand-in used when no relay is configured. Every send fails transiently,
/// so schedules are still purged by the sweep and subscriptions are kept.
#[derive(Debug, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl PushProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn send(
        &self,
        _subscription: &PushSubscription,
        _payload: &PushPayload,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::Transient(
            "push relay not configured".to_string(),
        ))
    }
}
