//! Per-key async locks for create-if-absent paths.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// A set of async mutexes keyed by storage key
///
/// Callers holding the guard for a key are serialized against each other;
/// different keys never contend. An entry is dropped once its last guard
/// is released and nobody is waiting on it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

/// Held lock on one key; released on drop
pub struct KeyGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl KeyedLocks {
    /// Create an empty lock set
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        KeyGuard {
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no key is held or waited on
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();

        // Waiters hold their own clone, so count 1 means only the map is left
        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("salt").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_independent() {
        let locks = KeyedLocks::new();

        let _a = locks.lock("a").await;
        // Would deadlock if keys shared a mutex
        let _b = locks.lock("b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyedLocks::new();

        for uid in ["alice", "bob", "carol"] {
            let _guard = locks.lock(uid).await;
        }

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_queued() {
        let locks = Arc::new(KeyedLocks::new());
        let first = locks.lock("alice").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("alice").await;
            })
        };
        // Let the waiter clone the mutex and park on it
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
