//! Outermost stage: structured start/finish records, timing and slow-operation warnings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::AppError;

use super::{Next, Operation, OperationContext, Stage};

const TARGET: &str = "shelfmark::pipeline";

pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(500);

pub struct LoggingStage {
    slow_threshold: Duration,
}

impl Default for LoggingStage {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_THRESHOLD)
    }
}

impl LoggingStage {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }
}

/// Short correlation id for one invocation.
fn correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn trace_payload<T: Serialize + ?Sized>(request_id: &str, operation: &str, label: &str, value: &T) {
    if !tracing::enabled!(target: TARGET, Level::DEBUG) {
        return;
    }
    match serde_json::to_string(value) {
        Ok(body) => debug!(target: TARGET, request_id, operation, label, body = %body, "operation data"),
        Err(err) => debug!(
            target: TARGET,
            request_id,
            operation,
            label,
            error = %err,
            "operation data could not be serialized"
        ),
    }
}

#[async_trait]
impl<O: Operation> Stage<O> for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn process(
        &self,
        op: &O,
        ctx: &OperationContext,
        next: Next<'_, O>,
    ) -> Result<O::Output, AppError> {
        let request_id = correlation_id();
        let operation = O::NAME;
        info!(target: TARGET, request_id = %request_id, operation, "operation started");
        trace_payload(&request_id, operation, "request", op);

        let started = Instant::now();
        let result = next.run(op, ctx).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        histogram!("shelfmark_operation_ms", "operation" => operation).record(elapsed.as_secs_f64() * 1000.0);

        match &result {
            Ok(output) => {
                info!(target: TARGET, request_id = %request_id, operation, elapsed_ms, "operation completed");
                trace_payload(&request_id, operation, "response", output);
                if elapsed > self.slow_threshold {
                    warn!(
                        target: TARGET,
                        request_id = %request_id,
                        operation,
                        elapsed_ms,
                        threshold_ms = self.slow_threshold.as_millis() as u64,
                        "slow operation"
                    );
                }
            }
            Err(err) if err.is_expected() => {
                warn!(target: TARGET, request_id = %request_id, operation, elapsed_ms, error = %err, "operation rejected");
            }
            Err(err) => {
                error!(target: TARGET, request_id = %request_id, operation, elapsed_ms, error = %err, "operation failed");
            }
        }

        result
    }
}
