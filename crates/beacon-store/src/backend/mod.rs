//! Substitutable key-value backends.
//!
//! - `file`: one `<key>.json` file per collection
//! - `sqlite`: a `kv` table keyed by collection name
//! - `memory`: process-local map, with a switch to simulate outages

mod file;
mod memory;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use beacon_core::error::BeaconError;

/// A durable string-keyed blob store.
///
/// Collections are stored whole: callers read the entire value, mutate it,
/// and write it back. There is no compare-and-swap, so concurrent writers
/// race and the last one wins.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Read a value. `Ok(None)` means the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>, BeaconError>;

    /// Replace a value.
    async fn put(&self, key: &str, value: &str) -> Result<(), BeaconError>;
}
