//! Per-identity write locks.
//!
//! Writes for one identity serialize on that identity's slot; writes for
//! different identities never wait on each other. Readers take no key lock.
//!
//! A slot lives only while someone holds or waits for it, so the table is
//! bounded by the number of writes in flight, not by how many identities
//! were ever seen.
//!
//! ```ignore
//! let locks = KeyLocks::new();
//! let _guard = locks.acquire("0xabc")?;
//! // ... read-modify-write for 0xabc ...
//! // released on drop
//! ```

mod error;

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};

pub use error::LockError;

#[derive(Debug, Default)]
struct Slot {
    held: bool,
    waiters: usize,
}

/// Table of held identity keys.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<String, Slot>>,
    released: Condvar,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<String, Slot>>, LockError> {
        self.slots
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }

    /// Block until `key` is free, then hold it until the guard drops.
    pub fn acquire(&self, key: &str) -> Result<KeyGuard<'_>, LockError> {
        let mut table = self.table()?;
        loop {
            let slot = table.entry(key.to_string()).or_default();
            if !slot.held {
                slot.held = true;
                return Ok(KeyGuard {
                    locks: self,
                    key: key.to_string(),
                });
            }
            slot.waiters += 1;
            table = self
                .released
                .wait(table)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
            // a slot with waiters is never evicted
            if let Some(slot) = table.get_mut(key) {
                slot.waiters -= 1;
            }
        }
    }

    fn release(&self, key: &str) -> Result<(), LockError> {
        let mut table = self.table()?;
        let idle = match table.get_mut(key) {
            Some(slot) => {
                slot.held = false;
                slot.waiters == 0
            }
            None => false,
        };
        if idle {
            table.remove(key);
        }
        drop(table);
        self.released.notify_all();
        Ok(())
    }

    /// Keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table().map(|table| table.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held key; released when dropped.
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.locks.release(&self.key) {
            tracing::error!(key = %self.key, %err, "failed to release key lock");
        }
    }
}
