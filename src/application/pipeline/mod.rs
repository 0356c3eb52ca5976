//! Request pipeline: every operation passes through an ordered chain of
//! stages before reaching its single handler.
//!
//! Pipelines are composed once at startup with [`PipelineBuilder`]. The
//! standard composition is Logging → Validation → Cache → Handler, where the
//! cache stage is only present for [`Cacheable`] queries.

pub mod caching;
mod context;
pub mod logging;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::application::error::AppError;

pub use caching::{CacheStage, Cacheable};
pub use context::OperationContext;
pub use logging::LoggingStage;
pub use validation::{ValidationFailure, ValidationStage, Validator, ValidatorRegistry};

/// A request object: a command that changes state or a query that reads it.
pub trait Operation: Serialize + Send + Sync + 'static {
    type Output: Serialize + Send + Sync + 'static;

    /// Name used in logs and metrics.
    const NAME: &'static str;
}

#[async_trait]
pub trait Handler<O: Operation>: Send + Sync {
    async fn handle(&self, op: &O, ctx: &OperationContext) -> Result<O::Output, AppError>;
}

/// Cross-cutting behavior wrapped around a handler.
///
/// A stage may run code before and after delegating to `next`, or return
/// without calling it at all.
#[async_trait]
pub trait Stage<O: Operation>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        op: &O,
        ctx: &OperationContext,
        next: Next<'_, O>,
    ) -> Result<O::Output, AppError>;
}

/// The remainder of a pipeline after the current stage.
pub struct Next<'a, O: Operation> {
    stages: &'a [Arc<dyn Stage<O>>],
    handler: &'a dyn Handler<O>,
}

impl<'a, O: Operation> Next<'a, O> {
    pub async fn run(self, op: &O, ctx: &OperationContext) -> Result<O::Output, AppError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                stage.process(op, ctx, next).await
            }
            None => self.handler.handle(op, ctx).await,
        }
    }
}

/// A fully composed chain for one operation type.
pub struct Pipeline<O: Operation> {
    stages: Arc<[Arc<dyn Stage<O>>]>,
    handler: Arc<dyn Handler<O>>,
}

impl<O: Operation> Clone for Pipeline<O> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<O: Operation> Pipeline<O> {
    pub async fn send(&self, op: &O, ctx: &OperationContext) -> Result<O::Output, AppError> {
        let next = Next {
            stages: &self.stages,
            handler: self.handler.as_ref(),
        };
        next.run(op, ctx).await
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

pub struct PipelineBuilder<O: Operation> {
    stages: Vec<Arc<dyn Stage<O>>>,
}

impl<O: Operation> Default for PipelineBuilder<O> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<O: Operation> PipelineBuilder<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage inside the ones already added.
    pub fn stage(mut self, stage: impl Stage<O> + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn handler(self, handler: impl Handler<O> + 'static) -> Pipeline<O> {
        self.shared_handler(Arc::new(handler))
    }

    pub fn shared_handler(self, handler: Arc<dyn Handler<O>>) -> Pipeline<O> {
        Pipeline {
            stages: self.stages.into(),
            handler,
        }
    }
}
