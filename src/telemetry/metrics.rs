//! Metric instrument factories for hookwork.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter(super::SERVICE_NAME)
}

/// Counter: work items created.
pub fn work_created() -> Counter<u64> {
    meter()
        .u64_counter("hookwork.work.created")
        .with_description("Number of work items created")
        .build()
}

/// Counter: work items reaching a terminal status.
/// Labels: `result` ("success" | "error").
pub fn work_terminated() -> Counter<u64> {
    meter()
        .u64_counter("hookwork.work.terminated")
        .with_description("Number of work items terminated")
        .build()
}

/// Counter: log extractions.
/// Labels: `result` ("ok" | "error").
pub fn log_extractions() -> Counter<u64> {
    meter()
        .u64_counter("hookwork.log.extractions")
        .with_description("Number of log content extractions")
        .build()
}

/// Histogram: script run duration in milliseconds.
/// Labels: `result` ("success" | "error").
pub fn script_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("hookwork.script.duration_ms")
        .with_description("Script run duration in milliseconds")
        .with_unit("ms")
        .build()
}
