use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
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

pub(crate) fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "syncdeck_cache_hit_total",
            Unit::Count,
            "Total number of reads served from the query cache."
        );
        describe_counter!(
            "syncdeck_cache_miss_total",
            Unit::Count,
            "Total number of reads that issued a network fetch."
        );
        describe_counter!(
            "syncdeck_cache_evict_total",
            Unit::Count,
            "Total number of cache entries evicted, by reason."
        );
        describe_counter!(
            "syncdeck_cache_discard_total",
            Unit::Count,
            "Total number of fetch responses dropped as superseded, evicted or cancelled."
        );
        describe_histogram!(
            "syncdeck_cache_fetch_ms",
            Unit::Milliseconds,
            "Query fetch latency in milliseconds."
        );
        describe_histogram!(
            "syncdeck_mutation_ms",
            Unit::Milliseconds,
            "Mutation round-trip latency in milliseconds."
        );
    });
}
