//! # beacon-push
//!
//! Outbound push delivery for Beacon.

pub mod relay;
pub mod service;

#[cfg(test)]
mod tests;

pub use relay::{classify_status, RelayProvider, UnconfiguredProvider};
pub use service::PushService;

use beacon_core::{config::PushConfig, error::BeaconError, traits::PushProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the provider selected by `[push]`.
pub fn build_provider(config: &PushConfig) -> Result<Arc<dyn PushProvider>, BeaconError> {
    if !config.is_configured() {
        warn!("push: no relay_url configured, pushes will fail until one is set");
        return Ok(Arc::new(UnconfiguredProvider));
    }
    if config.vapid_public_key.is_empty() || config.vapid_private_key.is_empty() {
        warn!("push: VAPID keys missing, the relay will likely reject sends");
    }
    let provider = RelayProvider::from_config(config)?;
    info!("push: relay at {}", provider.send_url());
    Ok(Arc::new(provider))
}
