//! Per-message pass serialization

use crate::transport::MessageRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Ensures at most one pass runs for a given vote message at a time.
/// Passes on different messages proceed independently.
#[derive(Default)]
pub struct PassLocks {
    locks: Mutex<HashMap<MessageRef, Arc<AsyncMutex<()>>>>,
}

impl PassLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `message`; released when the guard drops
    pub async fn acquire(&self, message: &MessageRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map references are idle
            locks.retain(|key, lock| key == message || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(message.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
