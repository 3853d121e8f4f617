use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
///
/// Logs go to stderr; stdout is reserved for command output.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "inkpost_comment_cache_hit_total",
            Unit::Count,
            "Comment list reads served from the key-value cache."
        );
        describe_counter!(
            "inkpost_comment_cache_miss_total",
            Unit::Count,
            "Comment list reads that found no usable cache entry."
        );
        describe_counter!(
            "inkpost_comment_cache_bypass_total",
            Unit::Count,
            "Comment list reads that skipped the cache (forced or unhealthy)."
        );
        describe_counter!(
            "inkpost_comment_cache_write_failure_total",
            Unit::Count,
            "Failed cache writes, labelled by operation."
        );
        describe_counter!(
            "inkpost_comment_cache_probe_total",
            Unit::Count,
            "Cache health probes run, labelled by result."
        );
        describe_gauge!(
            "inkpost_comment_cache_healthy",
            Unit::Count,
            "1 while the cache backend is believed healthy, 0 otherwise."
        );
        describe_histogram!(
            "inkpost_comment_store_read_ms",
            Unit::Milliseconds,
            "Document store comment list latency in milliseconds."
        );
    });
}
