use std::error::Error as StdError;
use std::sync::Once;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::ports::TelemetrySink;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const TARGET: &str = "shelfmark::telemetry";

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "shelfmark_cache_hit_total",
            Unit::Count,
            "Total number of query results served from cache."
        );
        describe_counter!(
            "shelfmark_cache_miss_total",
            Unit::Count,
            "Total number of cache lookups that fell through to the handler."
        );
        describe_counter!(
            "shelfmark_cache_error_total",
            Unit::Count,
            "Total number of cache operations that failed and were absorbed."
        );
        describe_histogram!(
            "shelfmark_operation_ms",
            Unit::Milliseconds,
            "End-to-end pipeline latency per operation in milliseconds."
        );
        describe_counter!(
            "shelfmark_event_total",
            Unit::Count,
            "Total number of business events tracked, labelled by event name."
        );
        describe_counter!(
            "shelfmark_exception_total",
            Unit::Count,
            "Total number of exceptions reported to telemetry."
        );
    });
}

/// [`TelemetrySink`] backed by the `metrics` facade and tracing records.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

fn render_properties(properties: &[(&str, String)]) -> String {
    properties
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl TelemetrySink for MetricsTelemetry {
    fn track_event(&self, name: &str, properties: &[(&str, String)]) {
        counter!("shelfmark_event_total", "event" => name.to_string()).increment(1);
        info!(
            target: TARGET,
            event = name,
            properties = %render_properties(properties),
            "telemetry event"
        );
    }

    fn track_metric(&self, name: &str, value: f64) {
        histogram!(format!("shelfmark_{name}")).record(value);
    }

    fn track_exception(&self, err: &(dyn StdError + 'static), properties: &[(&str, String)]) {
        counter!("shelfmark_exception_total").increment(1);
        error!(
            target: TARGET,
            error = err,
            properties = %render_properties(properties),
            "telemetry exception"
        );
    }
}
