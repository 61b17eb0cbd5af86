//! Logging and OpenTelemetry setup.
//!
//! The crate is usually a guest inside a host process, so initialization
//! never fights over the global subscriber: if the host already installed
//! one, our events flow into it and no exporters are started. Otherwise a
//! stderr fmt layer is installed, plus OTLP traces, metrics and logs when an
//! endpoint is configured.

pub mod dispatch;
pub mod metrics;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

const TRACER_NAME: &str = "modhelper-rs";

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`. `None` means
    /// stderr output only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter used when `RUST_LOG` is not set (e.g. "info", "modhelper_rs=debug").
    pub log_level: String,
}

/// The three OTLP pipelines, built together against one endpoint.
struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Providers {
    fn build(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::WithExportConfig as _;

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(service_name)
            .build();

        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    fn force_flush(&self) {
        let _ = self.tracer.force_flush();
        let _ = self.meter.force_flush();
        let _ = self.logger.force_flush();
    }

    fn shutdown(self) {
        let _ = self.logger.shutdown();
        let _ = self.meter.shutdown();
        let _ = self.tracer.shutdown();
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to build OTLP {signal} exporter: {e}"))
}

/// Keeps the exporters alive. Dropping it flushes and shuts them down.
///
/// A guard returned while the host owns the subscriber holds nothing and
/// dropping it is a no-op.
pub struct TelemetryGuard {
    providers: Option<Providers>,
    owns_subscriber: bool,
}

impl TelemetryGuard {
    fn detached() -> Self {
        Self {
            providers: None,
            owns_subscriber: false,
        }
    }

    /// Whether this call installed the global subscriber.
    pub fn owns_subscriber(&self) -> bool {
        self.owns_subscriber
    }

    /// Whether OTLP exporters are running behind this guard.
    pub fn exports(&self) -> bool {
        self.providers.is_some()
    }

    /// Push buffered spans, metrics and logs out now. Call before the host
    /// unloads the library.
    pub fn force_flush(&self) {
        if let Some(providers) = &self.providers {
            providers.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(providers) = self.providers.take() {
            providers.shutdown();
        }
    }
}

/// Install logging, and OTLP export when `config.endpoint` is set.
///
/// A subscriber installed earlier by the host is left in place and a
/// detached guard is returned.
///
/// # Errors
///
/// Returns an error if an OTLP exporter fails to build.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let providers = config
        .endpoint
        .as_deref()
        .map(|endpoint| Providers::build(endpoint, config.service_name))
        .transpose()?;

    let trace_layer = providers
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer.tracer(TRACER_NAME)));
    let log_layer = providers
        .as_ref()
        .map(|p| OpenTelemetryTracingBridge::new(&p.logger));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .is_ok();

    if !installed {
        // The host owns the global subscriber. Nothing would feed our
        // exporters, so they go away again.
        debug!("tracing subscriber already installed by the host, leaving it in place");
        if let Some(providers) = providers {
            providers.shutdown();
        }
        return Ok(TelemetryGuard::detached());
    }

    if let Some(p) = &providers {
        opentelemetry::global::set_meter_provider(p.meter.clone());
    }
    Ok(TelemetryGuard {
        providers,
        owns_subscriber: true,
    })
}
