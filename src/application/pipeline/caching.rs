//! Cache-aside stage for read operations.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::error::AppError;
use crate::cache::{CacheKey, ResilientCache};

use super::{Next, Operation, OperationContext, Stage};

const TARGET: &str = "shelfmark::pipeline::cache";

/// A query whose result may be served from cache.
pub trait Cacheable: Operation {
    fn cache_key(&self) -> CacheKey;

    /// Lifetime for this result; `None` uses the pipeline default.
    fn cache_duration(&self) -> Option<Duration> {
        None
    }

    /// Whether a freshly computed result should be stored.
    fn should_cache(&self, _output: &Self::Output) -> bool {
        true
    }
}

pub struct CacheStage {
    cache: ResilientCache,
    default_ttl: Duration,
}

impl CacheStage {
    pub fn new(cache: ResilientCache, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }
}

#[async_trait]
impl<O> Stage<O> for CacheStage
where
    O: Cacheable,
    O::Output: DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn process(
        &self,
        op: &O,
        ctx: &OperationContext,
        next: Next<'_, O>,
    ) -> Result<O::Output, AppError> {
        let key = op.cache_key();
        if let Some(cached) = self.cache.get::<O::Output>(&key, ctx.cancellation()).await {
            debug!(target: TARGET, operation = O::NAME, key = %key, "cache hit");
            return Ok(cached);
        }
        debug!(target: TARGET, operation = O::NAME, key = %key, "cache miss");

        let output = next.run(op, ctx).await?;
        if op.should_cache(&output) {
            let ttl = op.cache_duration().unwrap_or(self.default_ttl);
            self.cache.set(&key, &output, ttl, ctx.cancellation()).await;
        }
        Ok(output)
    }
}
