//! Cancellable one-shot timers keyed by group or channel
//!
//! Every deferred action (scheduled stop, cooldown expiry, hold trigger) is a task in a
//! `TimerSet`. At most one timer exists per key: scheduling a key again aborts the previous
//! timer before the new one is registered (last schedule wins). A timer removes its own entry
//! right before its action runs, so cancelling a fired or already cancelled timer finds nothing
//! and is a no-op.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

struct Entry {
    generation: u64,
    handle: AbortHandle,
}

struct TimerTable<K> {
    next_generation: u64,
    entries: HashMap<K, Entry>,
}

/// Set of cancellable timers; cloning shares the same set
pub struct TimerSet<K> {
    inner: Arc<Mutex<TimerTable<K>>>,
}

impl<K> Clone for TimerSet<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for TimerSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<K>(table: &Mutex<TimerTable<K>>) -> MutexGuard<'_, TimerTable<K>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> TimerSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimerTable {
                next_generation: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// Run `action` after `delay`, replacing any timer already pending for `key`
    ///
    /// Returns `true` if a pending timer was replaced.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut table = lock(&self.inner);
        let generation = table.next_generation;
        table.next_generation += 1;

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let claimed = {
                let mut table = lock(&inner);
                match table.entries.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        table.entries.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };

            if claimed {
                action.await;
            }
        });

        let replaced = table.entries.insert(
            key,
            Entry {
                generation,
                handle: task.abort_handle(),
            },
        );

        match replaced {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the pending timer for `key`; returns whether one was pending
    pub fn cancel(&self, key: &K) -> bool {
        let entry = lock(&self.inner).entries.remove(key);
        match entry {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer, returning the keys that were pending
    pub fn cancel_all(&self) -> Vec<K> {
        let drained: Vec<(K, Entry)> = lock(&self.inner).entries.drain().collect();
        drained
            .into_iter()
            .map(|(key, entry)| {
                entry.handle.abort();
                key
            })
            .collect()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.inner).entries.contains_key(key)
    }

    pub fn pending_keys(&self) -> Vec<K> {
        lock(&self.inner).entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
