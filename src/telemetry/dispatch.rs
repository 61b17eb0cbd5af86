//! Dispatch span helpers.
//!
//! One span per drain pass, one child span per work item it runs.

use tracing::Span;

/// Start a span for a drain pass.
///
/// The totals are declared empty and filled by [`record_drain_totals`].
pub fn start_drain_span(pending: usize) -> Span {
    tracing::info_span!(
        "dispatch.drain",
        "dispatch.pending" = pending,
        "dispatch.executed" = tracing::field::Empty,
        "dispatch.failed" = tracing::field::Empty,
    )
}

pub fn record_drain_totals(span: &Span, executed: usize, failed: usize) {
    span.record("dispatch.executed", executed);
    span.record("dispatch.failed", failed);
}

/// Start a span for a single work item.
///
/// `mode` is `"queued"` for drained items and `"inline"` for the fallback
/// path that runs on the producer's thread.
pub fn start_item_span(kind: &str, mode: &str) -> Span {
    tracing::info_span!(
        "dispatch.item",
        "dispatch.item.kind" = kind,
        "dispatch.item.mode" = mode,
        "dispatch.item.status" = tracing::field::Empty,
    )
}

pub fn record_item_status(span: &Span, status: &str) {
    span.record("dispatch.item.status", status);
}
