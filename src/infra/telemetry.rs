use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE_FAILED, METRIC_CACHE_MISS, METRIC_CACHE_STORE_FAILED,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::events::{
    METRIC_EVENTS_BROADCAST, METRIC_EVENTS_MALFORMED, METRIC_EVENTS_PUBLISH_FAILED,
    METRIC_EVENTS_PUBLISHED, METRIC_NOTIFICATION_CONNECTIONS,
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

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

/// Registers descriptions for every metric the services emit. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of read-through cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of read-through cache misses, including unreadable entries."
        );
        describe_counter!(
            METRIC_CACHE_STORE_FAILED,
            Unit::Count,
            "Total number of failed attempts to populate the cache after a miss."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATE_FAILED,
            Unit::Count,
            "Total number of failed cache invalidations on the write path."
        );
        describe_counter!(
            METRIC_EVENTS_PUBLISHED,
            Unit::Count,
            "Total number of change events published."
        );
        describe_counter!(
            METRIC_EVENTS_PUBLISH_FAILED,
            Unit::Count,
            "Total number of change events that could not be published."
        );
        describe_counter!(
            METRIC_EVENTS_MALFORMED,
            Unit::Count,
            "Total number of received change events dropped as malformed."
        );
        describe_counter!(
            METRIC_EVENTS_BROADCAST,
            Unit::Count,
            "Total number of change events fanned out to live connections."
        );
        describe_gauge!(
            METRIC_NOTIFICATION_CONNECTIONS,
            Unit::Count,
            "Current number of live notification connections."
        );
    });
}
