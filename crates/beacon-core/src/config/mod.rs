mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BeaconError;
use crate::time::parse_timezone;
use chrono_tz::Tz;
use defaults::*;

/// Top-level Beacon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write a daily-rolling log file under `{data_dir}/logs`.
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            log_to_file: false,
        }
    }
}

/// Which key-value medium backs the schedule store and subscription registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON file per collection (default).
    #[default]
    File,
    /// A `kv` table in a SQLite database.
    Sqlite,
    /// Process-local; nothing survives a restart.
    Memory,
}

/// Store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the file backend.
    #[serde(default = "default_store_dir")]
    pub dir: String,
    /// Database path for the SQLite backend.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dir: default_store_dir(),
            db_path: default_db_path(),
        }
    }
}

/// Push relay configuration.
///
/// The relay performs the VAPID handshake and payload encryption; Beacon only
/// hands it the subscription, the payload, and the VAPID details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Base URL of the relay. Empty = push delivery disabled.
    #[serde(default)]
    pub relay_url: String,
    /// Public application server key handed to clients for subscribing.
    #[serde(default)]
    pub vapid_public_key: String,
    #[serde(default)]
    pub vapid_private_key: String,
    #[serde(default = "default_vapid_subject")]
    pub vapid_subject: String,
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
    /// How long the push service may hold an undelivered message.
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            relay_url: String::new(),
            vapid_public_key: String::new(),
            vapid_private_key: String::new(),
            vapid_subject: default_vapid_subject(),
            timeout_secs: default_push_timeout(),
            ttl_secs: default_push_ttl(),
        }
    }
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        !self.relay_url.trim().is_empty()
    }
}

/// Scheduler configuration -- fire-time computation and the sweep loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// IANA zone used to interpret `scheduledDate` + `scheduledTime`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Body used when a request omits one. `{time}` expands to the event time.
    #[serde(default = "default_body_template")]
    pub default_body: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            timezone: default_timezone(),
            default_body: default_body_template(),
        }
    }
}

impl SchedulerConfig {
    pub fn tz(&self) -> Result<Tz, BeaconError> {
        parse_timezone(&self.timezone)
    }
}

/// Background worker configuration -- restore-on-wake timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-instance pending cache, kept apart from the schedule store.
    #[serde(default = "default_worker_cache_dir")]
    pub cache_dir: String,
    /// Periodic sync: forced re-scan of the pending cache.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// How long the dispatcher waits for the worker to confirm a schedule.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: default_worker_cache_dir(),
            sync_interval_secs: default_sync_interval(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for API authentication. Empty = no auth (for local-only use).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Override secrets from the environment. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let pairs: [(&str, &mut String); 4] = [
        ("BEACON_VAPID_PUBLIC_KEY", &mut config.push.vapid_public_key),
        ("BEACON_VAPID_PRIVATE_KEY", &mut config.push.vapid_private_key),
        ("BEACON_VAPID_SUBJECT", &mut config.push.vapid_subject),
        ("BEACON_API_KEY", &mut config.api.api_key),
    ];
    for (var, slot) in pairs {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Environment overrides
/// are applied either way.
pub fn load(path: &str) -> Result<Config, BeaconError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BeaconError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| BeaconError::Config(format!("failed to parse config: {}", e)))?
    };

    apply_env_overrides(&mut config, |k| std::env::var(k).ok());

    // Fail early on a bad zone rather than on the first scheduling request.
    config.scheduler.tz()?;

    Ok(config)
}
