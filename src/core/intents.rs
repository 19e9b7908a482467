use std::{
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

use hashbrown::HashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a mutation on one key runs; dropping it lets the next queued
/// mutation on that key proceed.
pub type IntentGuard = OwnedMutexGuard<()>;

/// FIFO intent queue per key.
///
/// Mutations on the same key run one after another in arrival order;
/// mutations on distinct keys do not wait for each other.
pub struct IntentQueue<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for IntentQueue<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> IntentQueue<K> {
    /// Queue with no pending intents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for every earlier intent on `key` to finish.
    pub async fn acquire(&self, key: &K) -> IntentGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Slots nobody holds or waits on are dropped here.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of keys with a running or queued intent.
    pub fn busy_keys(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}
