//! # beacon-store
//!
//! Durable state for Beacon: the schedule store and the subscription
//! registry, each a whole JSON collection on a substitutable key-value backend.

pub mod backend;
mod collection;
pub mod schedules;
pub mod subscriptions;


pub use backend::{FileBackend, KvBackend, MemoryBackend, SqliteBackend};
pub use schedules::ScheduleStore;
pub use subscriptions::SubscriptionRegistry;

use beacon_core::config::{shellexpand, StoreBackend, StoreConfig};
use beacon_core::error::BeaconError;
use std::sync::Arc;
use tracing::info;

/// Open the backend selected by `[store]`.
pub async fn open_backend(config: &StoreConfig) -> Result<Arc<dyn KvBackend>, BeaconError> {
    let backend: Arc<dyn KvBackend> = match config.backend {
        StoreBackend::File => {
            let dir = shellexpand(&config.dir);
            info!("File store at {dir}");
            Arc::new(FileBackend::new(dir))
        }
        StoreBackend::Sqlite => Arc::new(SqliteBackend::open(&config.db_path).await?),
        StoreBackend::Memory => {
            info!("Memory store (schedules will not survive a restart)");
            Arc::new(MemoryBackend::new())
        }
    };
    Ok(backend)
}
