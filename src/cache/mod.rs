//! Cache-aside storage for query results.
//!
//! - [`CacheStore`]: byte-level backends ([`MemoryCacheStore`], and
//!   `RedisCacheStore` behind the `redis` feature).
//! - [`ResilientCache`]: typed facade that turns every backend failure into a
//!   miss or a no-op.
//! - [`keys`]: the `<namespace>:<id>` / `<namespace>:all` key layout.

pub mod config;
pub mod keys;
mod lock;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod resilient;
pub mod store;

use std::sync::Arc;

use tracing::info;

use crate::util::clock::Clock;

pub use config::{CacheBackend, CacheConfig};
pub use keys::CacheKey;
pub use memory::MemoryCacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;
pub use resilient::ResilientCache;
pub use store::{CacheError, CacheStore};

/// Build the configured backend.
pub async fn connect(
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Memory => {
            info!(
                capacity = config.memory_capacity_non_zero().get(),
                "using in-memory cache"
            );
            Ok(Arc::new(MemoryCacheStore::new(config, clock)))
        }
        CacheBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| CacheError::Unavailable("cache.redis_url is not set".to_string()))?;
    let store = RedisCacheStore::connect(url).await?;
    info!("using redis cache");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    Err(CacheError::Unavailable(
        "redis backend requested but the `redis` feature is not enabled".to_string(),
    ))
}
