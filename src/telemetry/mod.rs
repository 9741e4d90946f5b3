//! Tracing and OpenTelemetry initialization.
//!
//! Log lines (the `[SUCCESS]` / `[ERROR]` hook lines included) always go
//! to stderr. When `Config::otel_endpoint` is set, the same events plus
//! work spans and the `hookwork.*` metrics are also exported over OTLP.

pub mod metrics;
pub mod work;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::Config;
use crate::error::{Error, Result};

/// Reported as `service.name` and used as the tracer and meter name.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Keeps the OTLP pipelines alive. Dropping it flushes and shuts them down.
///
/// Without an endpoint the guard holds nothing.
#[must_use = "dropping the guard shuts telemetry export down"]
pub struct TelemetryGuard {
    otlp: Option<OtlpPipelines>,
}

impl TelemetryGuard {
    /// Whether spans, metrics and logs are exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.otlp.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(otlp) = self.otlp.take() {
            otlp.shutdown();
        }
    }
}

/// Install the global subscriber for the process.
///
/// The filter comes from `RUST_LOG`, or `config.log_level` when it is not
/// set.
///
/// # Errors
///
/// [`Error::Telemetry`] if an OTLP exporter cannot be built or a global
/// subscriber is already installed.
pub fn init_telemetry(config: &Config) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::Telemetry(format!("bad log level {:?}: {e}", config.log_level)))?;

    let otlp = config
        .otel_endpoint
        .as_deref()
        .map(OtlpPipelines::connect)
        .transpose()?;

    let trace_layer = otlp.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracers.tracer(SERVICE_NAME))
    });
    let log_layer = otlp.as_ref().map(|p| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.loggers)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Telemetry(format!("cannot install subscriber: {e}")))?;

    if let Some(endpoint) = &config.otel_endpoint {
        tracing::debug!(endpoint = %endpoint, "exporting telemetry over OTLP");
    }

    Ok(TelemetryGuard { otlp })
}

struct OtlpPipelines {
    tracers: SdkTracerProvider,
    meters: SdkMeterProvider,
    loggers: SdkLoggerProvider,
}

impl OtlpPipelines {
    /// Build the three tonic exporters against `endpoint` and make the
    /// meter provider global so `telemetry::metrics` picks it up.
    fn connect(endpoint: &str) -> Result<Self> {
        let resource = Resource::builder()
            .with_service_name(SERVICE_NAME)
            .with_attribute(opentelemetry::KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ))
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

        let pipelines = Self {
            tracers: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meters: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            loggers: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        };
        opentelemetry::global::set_meter_provider(pipelines.meters.clone());
        Ok(pipelines)
    }

    // Logs first so the shutdown of the other two can still be reported.
    fn shutdown(self) {
        if let Err(e) = self.loggers.shutdown() {
            eprintln!("{SERVICE_NAME}: log export shutdown failed: {e}");
        }
        if let Err(e) = self.meters.shutdown() {
            tracing::warn!("metric export shutdown failed: {e}");
        }
        if let Err(e) = self.tracers.shutdown() {
            tracing::warn!("span export shutdown failed: {e}");
        }
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Telemetry(format!("cannot build OTLP {signal} exporter: {e}"))
}
