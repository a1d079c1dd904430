//! Per-key async locks and the acquisition clock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key, created on demand.
///
/// Holders of different keys never wait on each other.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock one key.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Lock several keys in sorted order. Duplicate keys are locked once.
    pub async fn lock_all(&self, keys: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&str> = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of tracked keys.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Hands out non-decreasing timestamps.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `candidate`, or the latest stamp issued so far if that is later.
    /// Stamps have microsecond resolution.
    pub fn stamp(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let micros = candidate.timestamp_micros();
        let prev = self.last_micros.fetch_max(micros, Ordering::SeqCst);
        DateTime::from_timestamp_micros(prev.max(micros)).unwrap_or(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("noah carter").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("noah carter").await;
        });
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("tokyo").await;
        let b = tokio::time::timeout(StdDuration::from_millis(100), locks.lock("paris")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_lock_all_dedups_and_releases() {
        let locks = KeyedLocks::new();
        let guards = locks.lock_all(&["b", "a", "b"]).await;
        assert_eq!(guards.len(), 2);
        drop(guards);
        let _c = locks.lock("c").await;
        assert_eq!(locks.len().await, 1);
    }

    #[test]
    fn test_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let now = Utc::now();
        let first = clock.stamp(now);
        let second = clock.stamp(now - Duration::hours(1));
        let third = clock.stamp(now + Duration::seconds(1));
        assert!(first <= now);
        assert_eq!(second, first);
        assert!(third > first);
        assert_eq!(third.timestamp(), (now + Duration::seconds(1)).timestamp());
    }
}
