//! Integration tests for telemetry initialization and span helpers.

use modhelper_rs::telemetry::dispatch::{
    record_drain_totals, record_item_status, start_drain_span, start_item_span,
};
use modhelper_rs::telemetry::{TelemetryConfig, init_telemetry};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;

/// In-memory sink for the fmt layer.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` under a scoped subscriber that prints each span's fields when it
/// closes, and return what was printed.
fn captured(f: impl FnOnce()) -> String {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE),
    );
    tracing::subscriber::with_default(subscriber, f);
    capture.contents()
}

fn config() -> TelemetryConfig {
    TelemetryConfig {
        endpoint: None,
        service_name: "modhelper-test".to_string(),
        log_level: "debug".to_string(),
    }
}

#[test]
fn init_tolerates_an_existing_subscriber() {
    // The only global install in this test binary.
    let first = init_telemetry(config()).expect("init without endpoint");
    assert!(first.owns_subscriber());
    assert!(!first.exports());

    let second = init_telemetry(config()).expect("second init returns a guard");
    assert!(!second.owns_subscriber());
    assert!(!second.exports());
    second.force_flush();
}

#[test]
fn drain_span_records_totals() {
    let output = captured(|| {
        let span = start_drain_span(3);
        assert!(!span.is_disabled());
        record_drain_totals(&span, 3, 1);
    });

    assert!(output.contains("dispatch.drain"), "{output}");
    assert!(output.contains("dispatch.pending=3"), "{output}");
    assert!(output.contains("dispatch.executed=3"), "{output}");
    assert!(output.contains("dispatch.failed=1"), "{output}");
}

#[test]
fn item_span_records_status() {
    let output = captured(|| {
        let span = start_item_span("spawn", "queued");
        assert!(!span.is_disabled());
        record_item_status(&span, "template_not_found");
    });

    assert!(output.contains("dispatch.item"), "{output}");
    assert!(output.contains("spawn"), "{output}");
    assert!(output.contains("queued"), "{output}");
    assert!(output.contains("template_not_found"), "{output}");
}

#[test]
fn metric_instruments_build_without_a_provider() {
    use modhelper_rs::telemetry::metrics;

    metrics::items_enqueued().add(1, &[]);
    metrics::items_failed().add(1, &[]);
    metrics::drain_duration_ms().record(0.5, &[]);
}
