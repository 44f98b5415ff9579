use super::*;
use async_trait::async_trait;
use beacon_core::{
    error::DeliveryError,
    notification::{PushPayload, PushSubscription, SubscriptionKeys},
};
use beacon_store::{MemoryBackend, SubscriptionRegistry};
use std::collections::HashMap;
use std::sync::Mutex;

/// Provider double: per-endpoint outcomes, records every call.
#[derive(Default)]
struct MockProvider {
    outcomes: HashMap<String, DeliveryError>,
    calls: Mutex<Vec<(String, PushPayload)>>,
}

impl MockProvider {
    fn failing(endpoint: &str, err: DeliveryError) -> Self {
        let mut outcomes = HashMap::new();
        outcomes.insert(endpoint.to_string(), err);
        Self {
            outcomes,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, PushPayload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
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
        match self.outcomes.get(&subscription.endpoint) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn sub(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        keys: SubscriptionKeys {
            p256dh: "BNc...".to_string(),
            auth: "tBH...".to_string(),
        },
    }
}

fn payload() -> PushPayload {
    PushPayload {
        title: "Concert presale".to_string(),
        body: "Starting soon: 10:00".to_string(),
        tag: Some("T1".to_string()),
    }
}

async fn service_with(provider: Arc<MockProvider>, endpoints: &[&str]) -> PushService {
    let registry = SubscriptionRegistry::new(Arc::new(MemoryBackend::new()));
    for e in endpoints {
        registry.upsert(sub(e)).await;
    }
    PushService::new(provider, registry, "public-key")
}

#[test]
fn test_classify_status() {
    assert!(classify_status(201, "").is_ok());
    assert_eq!(classify_status(410, ""), Err(DeliveryError::Gone(410)));
    assert_eq!(classify_status(404, ""), Err(DeliveryError::Gone(404)));
    match classify_status(429, "slow down") {
        Err(DeliveryError::Transient(msg)) => assert!(msg.contains("slow down")),
        other => panic!("expected transient, got {other:?}"),
    }
    assert!(!classify_status(500, "").unwrap_err().is_permanent());
}

#[test]
fn test_relay_request_shape() {
    let config = PushConfig {
        relay_url: "http://localhost:8787/".to_string(),
        vapid_public_key: "pub".to_string(),
        vapid_private_key: "priv".to_string(),
        ..Default::default()
    };
    let provider = RelayProvider::from_config(&config).unwrap();
    assert_eq!(provider.send_url(), "http://localhost:8787/send");

    let subscription = sub("https://push.example/a");
    let body = provider.request(&subscription, &payload()).unwrap();
    let json = serde_json::to_value(&body).unwrap();

    assert_eq!(json["subscription"]["endpoint"], "https://push.example/a");
    assert_eq!(json["subscription"]["keys"]["auth"], "tBH...");
    assert_eq!(json["vapid"]["publicKey"], "pub");
    assert_eq!(json["vapid"]["subject"], "mailto:admin@example.com");
    assert_eq!(json["ttl"], 86_400);

    // The payload travels as a string the client parses itself.
    let inner: PushPayload = serde_json::from_str(json["payload"].as_str().unwrap()).unwrap();
    assert_eq!(inner, payload());
}

#[tokio::test]
async fn test_relay_unreachable_is_transient() {
    let config = PushConfig {
        relay_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..Default::default()
    };
    let provider = RelayProvider::from_config(&config).unwrap();
    let result = provider.send(&sub("https://push.example/a"), &payload()).await;
    assert!(matches!(result, Err(DeliveryError::Transient(_))));
}

#[test]
fn test_build_provider_without_relay() {
    let provider = build_provider(&PushConfig::default()).unwrap();
    assert_eq!(provider.name(), "unconfigured");
}

#[tokio::test]
async fn test_send_success() {
    let provider = Arc::new(MockProvider::default());
    let service = service_with(provider.clone(), &["https://push.example/a"]).await;

    assert!(service.send(&sub("https://push.example/a"), &payload()).await);
    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.tag.as_deref(), Some("T1"));
    assert_eq!(service.public_key(), "public-key");
}

#[tokio::test]
async fn test_send_gone_removes_subscription() {
    let provider = Arc::new(MockProvider::failing(
        "https://push.example/a",
        DeliveryError::Gone(410),
    ));
    let service = service_with(
        provider,
        &["https://push.example/a", "https://push.example/b"],
    )
    .await;

    assert!(!service.send(&sub("https://push.example/a"), &payload()).await);
    let left = service.registry().list().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].endpoint, "https://push.example/b");
}

#[tokio::test]
async fn test_send_transient_keeps_subscription() {
    let provider = Arc::new(MockProvider::failing(
        "https://push.example/a",
        DeliveryError::Transient("503".to_string()),
    ));
    let service = service_with(provider, &["https://push.example/a"]).await;

    assert!(!service.send(&sub("https://push.example/a"), &payload()).await);
    assert_eq!(service.registry().list().await.len(), 1);
}

#[tokio::test]
async fn test_broadcast_counts_only_successes() {
    let provider = Arc::new(MockProvider::failing(
        "https://push.example/b",
        DeliveryError::Transient("timeout".to_string()),
    ));
    let endpoints = [
        "https://push.example/a",
        "https://push.example/b",
        "https://push.example/c",
    ];
    let service = service_with(provider.clone(), &endpoints).await;
    let subs = service.registry().list().await;

    assert_eq!(service.broadcast(&subs, &payload()).await, 2);
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn test_deliver_prefers_bound_subscription() {
    let provider = Arc::new(MockProvider::default());
    let endpoints = ["https://push.example/a", "https://push.example/b"];
    let service = service_with(provider.clone(), &endpoints).await;
    let subs = service.registry().list().await;

    assert_eq!(
        service
            .deliver(&subs, "https://push.example/b", &payload())
            .await,
        1
    );
    let called: Vec<String> = provider.calls().into_iter().map(|(e, _)| e).collect();
    assert_eq!(called, vec!["https://push.example/b"]);
}

#[tokio::test]
async fn test_deliver_broadcasts_when_unbound_or_vanished() {
    let provider = Arc::new(MockProvider::default());
    let endpoints = ["https://push.example/a", "https://push.example/b"];
    let service = service_with(provider.clone(), &endpoints).await;
    let subs = service.registry().list().await;

    assert_eq!(service.deliver(&subs, "", &payload()).await, 2);
    assert_eq!(
        service
            .deliver(&subs, "https://push.example/gone", &payload())
            .await,
        2
    );
    assert_eq!(provider.calls().len(), 4);
    assert_eq!(service.deliver(&[], "", &payload()).await, 0);
}
