//! Per-user lock registry
//!
//! Serializes token operations per user while letting distinct users proceed
//! fully in parallel. A user's mutex is created on first acquisition and
//! removed again when the last guard referencing it drops, so the registry
//! stays empty-ish no matter how many distinct users pass through the
//! process. Process-local only: multiple gateway instances do not exclude
//! each other (credential writes are last-write-wins).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub(crate) struct UserLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `user_id`, waiting behind any current holder.
    pub async fn acquire(&self, user_id: &str) -> UserLockGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().expect("user lock registry poisoned");
            map.entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        // Await outside the registry mutex so waiting on one user never
        // blocks acquisition for another
        let guard = lock.clone().lock_owned().await;
        UserLockGuard {
            registry: self,
            user_id: user_id.to_owned(),
            lock,
            _guard: guard,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

pub(crate) struct UserLockGuard<'a> {
    registry: &'a UserLocks,
    user_id: String,
    lock: Arc<AsyncMutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        let mut map = self
            .registry
            .inner
            .lock()
            .expect("user lock registry poisoned");
        // Exactly three strong references — the map entry, this guard's
        // `lock` field, and the owned mutex guard — mean nobody else holds
        // or waits on this user's mutex. Waiters clone under the registry
        // mutex, so the count cannot change underneath us here.
        if Arc::strong_count(&self.lock) == 3 {
            map.remove(&self.user_id);
        }
    }
}
