use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
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

/// Installs the global Prometheus recorder and returns the handle rendered at `/metrics`.
pub fn install_prometheus() -> Result<PrometheusHandle, InfraError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| InfraError::telemetry(format!("failed to install metrics recorder: {err}")))?;
    describe_metrics();
    Ok(handle)
}

/// Registers metric descriptions with the installed recorder. Only the first call counts.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "itsm_cache_hit_total",
            Unit::Count,
            "Total number of response cache hits."
        );
        describe_counter!(
            "itsm_cache_miss_total",
            Unit::Count,
            "Total number of response cache misses, including lookups that failed."
        );
        describe_counter!(
            "itsm_cache_error_total",
            Unit::Count,
            "Cache backend failures by operation."
        );
        describe_counter!(
            "itsm_cache_invalidated_total",
            Unit::Count,
            "Total number of cache keys removed by pattern invalidation."
        );
        describe_histogram!(
            "itsm_cache_operation_seconds",
            Unit::Seconds,
            "Cache backend latency by operation."
        );
        describe_counter!(
            "itsm_queue_published_total",
            Unit::Count,
            "Messages published by queue."
        );
        describe_counter!(
            "itsm_queue_publish_errors_total",
            Unit::Count,
            "Failed publishes by queue."
        );
        describe_counter!(
            "itsm_queue_consumed_total",
            Unit::Count,
            "Messages settled by the consumer, by queue and outcome (ack or nack)."
        );
        describe_counter!(
            "itsm_queue_settle_errors_total",
            Unit::Count,
            "Acks or nacks the broker refused, by queue and outcome."
        );
        describe_counter!(
            "itsm_notifications_sent_total",
            Unit::Count,
            "Messages accepted by Slack."
        );
        describe_counter!(
            "itsm_notifications_failed_total",
            Unit::Count,
            "Messages Slack rejected or that could not be delivered."
        );
        describe_counter!(
            "itsm_http_requests_total",
            Unit::Count,
            "HTTP responses by method, route and status."
        );
        describe_histogram!(
            "itsm_http_request_duration_seconds",
            Unit::Seconds,
            "HTTP request latency by method and route."
        );
    });
}
