//! Per-key async mutual exclusion
//!
//! Work for the same key runs one at a time; different keys proceed in
//! parallel. Entries are dropped from the table once no task holds or waits
//! on them, so the table only grows with the number of keys in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// A table of async locks indexed by string key.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: LockTable,
}

/// Held for as long as the caller owns `key`.
pub struct KeyGuard {
    key: String,
    table: LockTable,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds `key`, then hold it.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        KeyGuard {
            key: key.to_string(),
            table: self.table.clone(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn in_flight(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the table and one in our guard.
        let idle = table
            .get(&self.key)
            .map(|m| Arc::strong_count(m) <= 2)
            .unwrap_or(false);
        if idle {
            table.remove(&self.key);
        }
    }
}
