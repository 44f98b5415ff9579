//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "Beacon".to_string()
}

pub fn default_data_dir() -> String {
    "~/.beacon".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_store_dir() -> String {
    "~/.beacon/data".to_string()
}

pub fn default_db_path() -> String {
    "~/.beacon/data/beacon.db".to_string()
}

pub fn default_vapid_subject() -> String {
    "mailto:admin@example.com".to_string()
}

pub fn default_push_timeout() -> u64 {
    10
}

pub fn default_push_ttl() -> u64 {
    86_400
}

pub fn default_poll_interval() -> u64 {
    60
}

pub fn default_timezone() -> String {
    "UTC".to_string()
}

pub fn default_body_template() -> String {
    "Starting soon: {time}".to_string()
}

pub fn default_worker_cache_dir() -> String {
    "~/.beacon/worker".to_string()
}

pub fn default_sync_interval() -> u64 {
    300
}

pub fn default_confirm_timeout_ms() -> u64 {
    2_000
}

pub fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_api_port() -> u16 {
    3900
}
