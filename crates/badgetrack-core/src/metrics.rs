//! `OpenTelemetry` metrics for the reader pipeline.
//!
//! This module is only compiled when the `metrics` Cargo feature is enabled.
//! It sets up the OTLP exporter for traces and metrics and exposes counters
//! for extracted frames and dispatch outcomes.

use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};

/// Errors that can occur during metrics / tracing pipeline initialisation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to build an OTLP exporter.
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    /// Failed during `OTel` SDK shutdown or flush.
    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Opaque handle that keeps the `OpenTelemetry` providers alive.
///
/// Call [`MetricsGuard::shutdown`] for a graceful flush before exiting.
pub struct MetricsGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl MetricsGuard {
    /// Tracer for the `tracing-opentelemetry` layer.
    pub fn tracer(&self) -> SdkTracer {
        self.tracer_provider.tracer("badgetrack")
    }

    /// Gracefully shut down both providers, flushing any buffered telemetry.
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initialise the `OpenTelemetry` OTLP pipeline for traces **and** metrics.
///
/// * `endpoint` -- OTLP receiver URL, e.g. `"http://localhost:4317"` (gRPC).
pub fn init_metrics(endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(MetricsGuard {
        tracer_provider,
        meter_provider,
    })
}

struct PipelineCounters {
    frames: Counter<u64>,
    outcomes: Counter<u64>,
}

fn counters() -> &'static PipelineCounters {
    static COUNTERS: OnceLock<PipelineCounters> = OnceLock::new();
    COUNTERS.get_or_init(|| {
        let meter = global::meter("badgetrack");
        PipelineCounters {
            frames: meter
                .u64_counter("badgetrack.frames.extracted")
                .with_description("Frames recovered from reader byte streams")
                .build(),
            outcomes: meter
                .u64_counter("badgetrack.dispatch.outcomes")
                .with_description("Dispatched frames by outcome")
                .build(),
        }
    })
}

/// Count frames extracted from one chunk.
pub fn record_frames(source: &str, count: u64) {
    if count > 0 {
        counters()
            .frames
            .add(count, &[KeyValue::new("source", source.to_string())]);
    }
}

/// Count one dispatch outcome by kind (see `Outcome::kind`).
pub fn record_outcome(kind: &'static str) {
    counters().outcomes.add(1, &[KeyValue::new("outcome", kind)]);
}
