//! Metric instrument factories for modhelper-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"modhelper-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("modhelper-rs")
}

/// Counter: work items accepted by the dispatcher.
/// Labels: `kind` ("spawn" | "task").
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("modhelper.dispatch.enqueued")
        .with_description("Number of work items accepted")
        .build()
}

/// Counter: work items that ran to completion.
/// Labels: `kind`.
pub fn items_executed() -> Counter<u64> {
    meter()
        .u64_counter("modhelper.dispatch.executed")
        .with_description("Number of work items executed successfully")
        .build()
}

/// Counter: work items that failed.
/// Labels: `kind`, `error`.
pub fn items_failed() -> Counter<u64> {
    meter()
        .u64_counter("modhelper.dispatch.failed")
        .with_description("Number of work items that failed")
        .build()
}

/// Counter: items run inline because no execution context was available.
pub fn inline_fallbacks() -> Counter<u64> {
    meter()
        .u64_counter("modhelper.dispatch.inline_fallbacks")
        .with_description("Work items executed on the producer thread")
        .build()
}

/// Counter: pending items dropped by teardown.
pub fn items_discarded() -> Counter<u64> {
    meter()
        .u64_counter("modhelper.dispatch.discarded")
        .with_description("Pending work items discarded by cleanup")
        .build()
}

/// Histogram: drain pass duration in milliseconds.
pub fn drain_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("modhelper.dispatch.drain_duration_ms")
        .with_description("Drain pass duration in milliseconds")
        .with_unit("ms")
        .build()
}
