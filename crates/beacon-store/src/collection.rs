//! Whole-collection JSON arrays on top of a [`KvBackend`].

use crate::backend::KvBackend;
use beacon_core::error::BeaconError;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

/// A typed JSON array stored under one key.
pub(crate) struct Collection<T> {
    backend: Arc<dyn KvBackend>,
    key: &'static str,
    /// Shared by clones; held across a read-modify-write.
    writes: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            key: self.key,
            writes: Arc::clone(&self.writes),
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(backend: Arc<dyn KvBackend>, key: &'static str) -> Self {
        Self {
            backend,
            key,
            writes: Arc::new(Mutex::new(())),
            _marker: PhantomData,
        }
    }

    pub(crate) fn key(&self) -> &'static str {
        self.key
    }

    /// Serialize a load-modify-save cycle against other writers sharing this collection.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }

    /// Read the whole collection.
    ///
    /// A missing key is an empty collection. So is a corrupt one: it is logged
    /// and overwritten by the next successful save.
    pub(crate) async fn load(&self) -> Result<Vec<T>, BeaconError> {
        let Some(raw) = self.backend.get(self.key).await? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(
                    "{} collection on {} is unreadable, treating as empty: {e}",
                    self.key,
                    self.backend.name()
                );
                Ok(Vec::new())
            }
        }
    }

    /// Replace the whole collection.
    pub(crate) async fn save(&self, items: &[T]) -> Result<(), BeaconError> {
        let raw = serde_json::to_string_pretty(items)?;
        self.backend.put(self.key, &raw).await
    }
}
