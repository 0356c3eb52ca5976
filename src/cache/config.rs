//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Lifetime for cached query results that do not choose their own.
    pub default_ttl_secs: u64,
    /// Maximum entries held by the in-process store.
    pub memory_capacity: usize,
    /// Connection string for the redis backend.
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            default_ttl_secs: DEFAULT_TTL_SECS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            redis_url: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            default_ttl_secs: settings.default_ttl.as_secs(),
            memory_capacity: settings.memory_capacity.get(),
            redis_url: settings.redis_url.clone(),
        }
    }
}

impl CacheConfig {
    /// Default lifetime, never shorter than one second.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs.max(1))
    }

    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
