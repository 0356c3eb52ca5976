//! In-process LRU store with per-entry expiry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use time::OffsetDateTime;

use crate::util::clock::Clock;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::store::{CacheError, CacheStore};

const TARGET: &str = "shelfmark::cache::memory";

struct Entry {
    value: Vec<u8>,
    expires_at: OffsetDateTime,
}

pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.memory_capacity_non_zero())),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.clock.now();
        let mut entries = mutex_lock(&self.entries, TARGET, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add(ttl))
            .ok_or_else(|| CacheError::Operation(format!("ttl of {ttl:?} is out of range")))?;
        mutex_lock(&self.entries, TARGET, "set").put(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        mutex_lock(&self.entries, TARGET, "remove").pop(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::util::clock::ManualClock;

    use super::*;

    fn store_with_clock(capacity: usize) -> (MemoryCacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let config = CacheConfig {
            memory_capacity: capacity,
            ..Default::default()
        };
        (MemoryCacheStore::new(&config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (store, clock) = store_with_clock(8);
        store
            .set("books:all", b"[]".to_vec(), Duration::from_secs(60))
            .await
            .expect("set");

        clock.advance(Duration::from_secs(59));
        assert_eq!(store.get("books:all").await.expect("get"), Some(b"[]".to_vec()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("books:all").await.expect("get"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_rejected_without_storing() {
        let (store, _) = store_with_clock(8);

        let err = store
            .set("books:all", b"[]".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .expect_err("overflowing ttl");
        assert!(matches!(err, CacheError::Operation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, _) = store_with_clock(8);
        store
            .set("books:1", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .expect("set");

        store.remove("books:1").await.expect("first remove");
        store.remove("books:1").await.expect("second remove");
        assert_eq!(store.get("books:1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let (store, _) = store_with_clock(2);
        let ttl = Duration::from_secs(60);
        store.set("a", vec![1], ttl).await.expect("set a");
        store.set("b", vec![2], ttl).await.expect("set b");
        store.get("a").await.expect("touch a");
        store.set("c", vec![3], ttl).await.expect("set c");

        assert_eq!(store.get("b").await.expect("get b"), None);
        assert_eq!(store.get("a").await.expect("get a"), Some(vec![1]));
        assert_eq!(store.len(), 2);
    }
}
