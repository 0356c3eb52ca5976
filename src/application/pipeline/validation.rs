//! Validation stage and the validator registry.
//!
//! All validators registered for an operation run on every request and their
//! failures are concatenated; any failure rejects the request before the
//! cache or handler is touched.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::application::error::AppError;

use super::{Next, Operation, OperationContext, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A pure rule set for one operation type.
pub trait Validator<O>: Send + Sync {
    fn validate(&self, op: &O) -> Vec<ValidationFailure>;
}

/// Accumulates failures for a single validator pass.
#[derive(Debug, Default)]
pub struct Rules {
    failures: Vec<ValidationFailure>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` against `field` unless `holds` is true.
    pub fn check(&mut self, field: &str, holds: bool, message: impl Into<String>) -> &mut Self {
        if !holds {
            self.failures.push(ValidationFailure::new(field, message));
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str, message: impl Into<String>) -> &mut Self {
        self.check(field, !value.trim().is_empty(), message)
    }

    pub fn max_chars(
        &mut self,
        field: &str,
        value: &str,
        max: usize,
        message: impl Into<String>,
    ) -> &mut Self {
        self.check(field, value.chars().count() <= max, message)
    }

    pub fn finish(self) -> Vec<ValidationFailure> {
        self.failures
    }
}

/// Validators keyed by operation type, resolved when pipelines are composed.
#[derive(Default)]
pub struct ValidatorRegistry {
    sets: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<O: Operation>(&mut self, validator: impl Validator<O> + 'static) -> &mut Self {
        let set = self
            .sets
            .entry(TypeId::of::<O>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn Validator<O>>>::new()));
        if let Some(validators) = set.downcast_mut::<Vec<Arc<dyn Validator<O>>>>() {
            validators.push(Arc::new(validator));
        }
        self
    }

    pub fn validators_for<O: Operation>(&self) -> Vec<Arc<dyn Validator<O>>> {
        self.sets
            .get(&TypeId::of::<O>())
            .and_then(|set| set.downcast_ref::<Vec<Arc<dyn Validator<O>>>>())
            .cloned()
            .unwrap_or_default()
    }
}

pub struct ValidationStage<O> {
    validators: Vec<Arc<dyn Validator<O>>>,
}

impl<O: Operation> ValidationStage<O> {
    pub fn new(validators: Vec<Arc<dyn Validator<O>>>) -> Self {
        Self { validators }
    }

    pub fn from_registry(registry: &ValidatorRegistry) -> Self {
        Self::new(registry.validators_for::<O>())
    }

    /// Run every validator and collect all failures.
    pub fn check(&self, op: &O) -> Vec<ValidationFailure> {
        self.validators
            .iter()
            .flat_map(|validator| validator.validate(op))
            .collect()
    }
}

#[async_trait]
impl<O: Operation> Stage<O> for ValidationStage<O> {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn process(
        &self,
        op: &O,
        ctx: &OperationContext,
        next: Next<'_, O>,
    ) -> Result<O::Output, AppError> {
        if self.validators.is_empty() {
            return next.run(op, ctx).await;
        }

        let failures = self.check(op);
        if !failures.is_empty() {
            debug!(
                operation = O::NAME,
                failures = failures.len(),
                "operation rejected by validation"
            );
            return Err(AppError::Validation(failures));
        }

        next.run(op, ctx).await
    }
}
