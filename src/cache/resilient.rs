//! Typed cache facade that never fails its caller.
//!
//! Backend errors, undecodable payloads and cancelled calls are logged and
//! reported as a miss (for reads) or a no-op (for writes).

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::util::cancel::Cancellation;

use super::keys::CacheKey;
use super::store::CacheStore;

const TARGET: &str = "shelfmark::cache";

#[derive(Clone)]
pub struct ResilientCache {
    store: Arc<dyn CacheStore>,
}

impl ResilientCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get<T>(&self, key: &CacheKey, cancel: &Cancellation) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target: TARGET, key = %key, "cache read cancelled");
                return None;
            }
            result = self.store.get(key.as_str()) => result,
        };

        match lookup {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    counter!("shelfmark_cache_hit_total").increment(1);
                    Some(value)
                }
                Err(err) => {
                    counter!("shelfmark_cache_error_total").increment(1);
                    warn!(target: TARGET, key = %key, error = %err, "cached value could not be decoded");
                    None
                }
            },
            Ok(None) => {
                counter!("shelfmark_cache_miss_total").increment(1);
                None
            }
            Err(err) => {
                counter!("shelfmark_cache_error_total").increment(1);
                warn!(target: TARGET, key = %key, error = %err, "cache read failed");
                None
            }
        }
    }

    pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl: Duration, cancel: &Cancellation)
    where
        T: Serialize + ?Sized,
    {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                counter!("shelfmark_cache_error_total").increment(1);
                warn!(target: TARGET, key = %key, error = %err, "value could not be encoded for cache");
                return;
            }
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(target: TARGET, key = %key, "cache write cancelled");
                return;
            }
            result = self.store.set(key.as_str(), bytes, ttl) => result,
        };

        if let Err(err) = written {
            counter!("shelfmark_cache_error_total").increment(1);
            warn!(target: TARGET, key = %key, error = %err, "cache write failed");
        }
    }

    /// Evict a key. Not cancellable: invalidation belongs to a committed mutation.
    pub async fn remove(&self, key: &CacheKey) {
        match self.store.remove(key.as_str()).await {
            Ok(()) => debug!(target: TARGET, key = %key, "cache entry invalidated"),
            Err(err) => {
                counter!("shelfmark_cache_error_total").increment(1);
                warn!(target: TARGET, key = %key, error = %err, "cache invalidation failed");
            }
        }
    }
}
