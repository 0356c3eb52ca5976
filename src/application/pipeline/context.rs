use std::future::Future;

use crate::application::error::AppError;
use crate::util::cancel::{CancelGuard, Cancellation, cancellation};

/// Per-invocation state threaded through every stage and the handler.
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancellation: Cancellation,
}

impl OperationContext {
    pub fn new(cancellation: Cancellation) -> Self {
        Self { cancellation }
    }

    /// A context that is never cancelled, for background callers and tests.
    pub fn detached() -> Self {
        Self::new(Cancellation::never())
    }

    /// A context cancelled as soon as the returned guard is dropped.
    pub fn scoped() -> (CancelGuard, Self) {
        let (guard, signal) = cancellation();
        (guard, Self::new(signal))
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Fail fast if the caller has already gone away.
    pub fn ensure_active(&self) -> Result<(), AppError> {
        if self.cancellation.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Race `work` against cancellation; the work is dropped if cancellation wins.
    pub async fn run<T, F>(&self, work: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(AppError::Cancelled),
            result = work => result,
        }
    }
}
