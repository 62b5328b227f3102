// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge};

use once_cell::sync::Lazy;

// Metric names are an operational contract: dashboards and alerts key on
// them, so they are never renamed silently.
pub const PROCESS_BLOCK_DURATION: &str = "sqs_ingest_usecase_process_block_duration";
pub const PROCESS_BLOCK_ERROR: &str = "sqs_ingest_usecase_process_block_error_total";
pub const PARSE_POOL_ERROR: &str = "sqs_ingest_usecase_parse_pool_error_total";
pub const PRICING_COMPUTE_ERROR: &str = "sqs_pricing_worker_compute_error_total";
pub const PRICING_COMPUTE_DURATION: &str = "sqs_pricing_worker_compute_duration";

static DESCRIBE_ONCE: Lazy<()> = Lazy::new(|| {
    describe_gauge!(
        PROCESS_BLOCK_DURATION,
        "Duration of processing a block in the ingest usecase, in milliseconds."
    );
    describe_counter!(
        PROCESS_BLOCK_ERROR,
        Unit::Count,
        "Total number of errors processing a block in the ingest usecase, labeled by err and height."
    );
    describe_counter!(
        PARSE_POOL_ERROR,
        Unit::Count,
        "Total number of errors parsing a pool in the ingest usecase, labeled by err."
    );
    describe_counter!(
        PRICING_COMPUTE_ERROR,
        Unit::Count,
        "Total number of errors encountered during pricing computation, labeled by height."
    );
    describe_gauge!(
        PRICING_COMPUTE_DURATION,
        "Duration of pricing computation for a block, in milliseconds."
    );

    // Cache metrics, labeled by cache name.
    describe_counter!("cache_hits_total", "Total cache hits, labeled by cache name.");
    describe_counter!(
        "cache_miss_total",
        "Total cache misses, labeled by cache name."
    );
    describe_gauge!(
        "cache_size_gauge",
        "Current size of a cache, labeled by cache name."
    );
});

/// Registers the descriptions for all metrics. Idempotent; call at startup.
pub fn describe_metrics() {
    Lazy::force(&DESCRIBE_ONCE);
}

// --- Helper functions to update metrics ---

pub fn record_process_block_duration(duration: std::time::Duration) {
    gauge!(PROCESS_BLOCK_DURATION, duration.as_millis() as f64);
}

// The two ingest error counters are emitted by the snapshot producer feeding
// `Router::update_snapshot`, which owns block parsing.

pub fn increment_process_block_error(err: &str, height: u64) {
    counter!(PROCESS_BLOCK_ERROR, 1, "err" => err.to_string(), "height" => height.to_string());
}

pub fn increment_parse_pool_error(err: &str) {
    counter!(PARSE_POOL_ERROR, 1, "err" => err.to_string());
}

pub fn increment_pricing_compute_error(height: u64) {
    counter!(PRICING_COMPUTE_ERROR, 1, "height" => height.to_string());
}

pub fn record_pricing_compute_duration(duration: std::time::Duration) {
    gauge!(PRICING_COMPUTE_DURATION, duration.as_millis() as f64);
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("cache_size_gauge", size, "cache" => cache_name.to_string());
}
