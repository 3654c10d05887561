//! Striped per-key locks.
//!
//! Keys hash onto a fixed set of async mutexes. Two calls on the same key
//! always contend; unrelated keys rarely do.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

const DEFAULT_STRIPES: usize = 64;

#[derive(Debug)]
pub struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl KeyLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Locks the stripe owning `key`.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.index(key)].lock().await
    }

    /// Locks every stripe in index order, for namespace-wide operations.
    pub async fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(self.stripes.len());
        for stripe in &self.stripes {
            guards.push(stripe.lock().await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_contends() {
        let locks = KeyLocks::new(8);
        let _held = locks.lock("k").await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock("k")).await;
        assert!(second.is_err(), "second lock on the same key must wait");
    }

    #[tokio::test]
    async fn test_lock_all_waits_for_key_holder() {
        let locks = KeyLocks::new(4);
        let held = locks.lock("k").await;

        let all = tokio::time::timeout(Duration::from_millis(50), locks.lock_all()).await;
        assert!(all.is_err());

        drop(held);
        assert_eq!(locks.lock_all().await.len(), 4);
    }
}
