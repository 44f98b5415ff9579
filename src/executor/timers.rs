//! Per-task one-shot timers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type TimerMap = HashMap<String, (u64, JoinHandle<()>)>;

/// Armed timers keyed by task id. At most one per task.
///
/// Each timer carries a generation number; a fired timer only clears its map
/// entry if the entry still belongs to it, so a re-armed task keeps its new
/// handle.
#[derive(Clone, Default)]
pub struct TimerSet {
    timers: Arc<Mutex<TimerMap>>,
    generation: Arc<AtomicU64>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, replacing any timer already armed for `task_id`.
    pub fn arm<F>(&self, task_id: &str, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let key = task_id.to_string();

        // Hold the lock across spawn so the task cannot finish before its entry exists.
        let mut map = self.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
            let mut map = timers.lock().unwrap_or_else(|e| e.into_inner());
            if map.get(&key).is_some_and(|(g, _)| *g == generation) {
                map.remove(&key);
            }
        });
        if let Some((_, old)) = map.insert(task_id.to_string(), (generation, handle)) {
            old.abort();
        }
    }

    /// Abort the timer for `task_id`. Returns whether one was armed.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.lock().remove(task_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every timer. Returns how many were armed.
    pub fn cancel_all(&self) -> usize {
        let mut map = self.lock();
        let n = map.len();
        for (_, (_, handle)) in map.drain() {
            handle.abort();
        }
        n
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerMap> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
