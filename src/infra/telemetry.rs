use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            "review_listing_cache_hit_total",
            Unit::Count,
            "Listing pages served from the page cache."
        );
        describe_counter!(
            "review_listing_cache_miss_total",
            Unit::Count,
            "Listing lookups that found no cached page."
        );
        describe_counter!(
            "review_listing_cache_error_total",
            Unit::Count,
            "Listing lookups failed by the page cache; no search fallback is attempted."
        );
        describe_counter!(
            "review_listing_coalesced_total",
            Unit::Count,
            "Listing callers that joined an in-flight fetch instead of starting one."
        );
        describe_counter!(
            "review_listing_search_total",
            Unit::Count,
            "Search backend queries issued for listing pages."
        );
        describe_counter!(
            "review_listing_dropped_record_total",
            Unit::Count,
            "Listing records dropped because they failed to decode."
        );
    });
}
