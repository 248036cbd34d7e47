//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection through the `metrics` facade with a Prometheus recorder
//! - A Prometheus text snapshot written at the end of a batch
//! - Optional distributed tracing export with OpenTelemetry
//! - Span helpers for the pipeline stages

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::prelude::*;

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;

/// Handles that must outlive the batch: the metrics renderer and the trace exporter
#[derive(Default)]
pub struct ObservabilityGuard {
    metrics_handle: Option<PrometheusHandle>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl ObservabilityGuard {
    pub fn metrics_handle(&self) -> Option<&PrometheusHandle> {
        self.metrics_handle.as_ref()
    }

    /// Flush pending spans to the OTLP endpoint, if one is configured
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down tracer provider");
            }
        }
    }
}

/// Initialize the complete observability stack with custom configuration
pub async fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<ObservabilityGuard> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;
    let metrics_handle = init_metrics_with_config(config)?;
    let tracer_provider = init_opentelemetry_tracing_with_config(config).await?;

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_enabled = %config.enable_metrics,
        "Observability stack initialized successfully"
    );
    Ok(ObservabilityGuard {
        metrics_handle,
        tracer_provider,
    })
}

/// Initialize structured logging with tracing and configuration.
///
/// Safe to call more than once: later calls keep the first subscriber.
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("label_measure={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    let installed = if config.use_pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
        return Ok(());
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the Prometheus recorder when metrics are enabled
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enable_metrics {
        tracing::info!("Metrics collection disabled");
        return Ok(None);
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(Some(handle))
}

/// Initialize OpenTelemetry distributed tracing with configuration
pub async fn init_opentelemetry_tracing_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<SdkTracerProvider>> {
    let Some(endpoint) = &config.otlp_endpoint else {
        tracing::info!("OpenTelemetry tracing disabled (no OTLP endpoint configured)");
        return Ok(None);
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let mut builder = SdkTracerProvider::builder().with_batch_exporter(otlp_exporter);
    if config.enable_trace_sampling {
        builder = builder.with_sampler(Sampler::TraceIdRatioBased(config.trace_sampling_ratio));
    }
    let tracer_provider = builder.build();

    global::set_tracer_provider(tracer_provider.clone());

    tracing::info!(
        otlp_endpoint = %endpoint,
        trace_sampling_enabled = %config.enable_trace_sampling,
        trace_sampling_ratio = %config.trace_sampling_ratio,
        "OpenTelemetry tracing initialized with OTLP export"
    );
    Ok(Some(tracer_provider))
}

/// Write the current Prometheus exposition text to `path`, replacing it atomically
pub fn write_metrics_snapshot(handle: &PrometheusHandle, path: &Path) -> AppResult<()> {
    let rendered = handle.render();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(rendered.as_bytes())?;
    temp.persist(path)
        .map_err(|e| AppError::FileSystem(format!("{}: {}", path.display(), e.error)))?;

    tracing::info!(path = %path.display(), bytes = rendered.len(), "Metrics snapshot written");
    Ok(())
}

/// Create a span for one image acquisition
pub fn fetch_span(url: &str) -> tracing::Span {
    tracing::info_span!("fetch_operation", url = url, component = "fetcher")
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span covering a whole batch
pub fn batch_span(items: usize) -> tracing::Span {
    tracing::info_span!("batch_run", items = items, component = "batch")
}

/// Create a span for one work item's pipeline
pub fn item_span(index: usize) -> tracing::Span {
    tracing::info_span!("batch_item", index = index, component = "batch")
}

/// Count one network attempt
pub fn record_fetch_attempt() {
    metrics::counter!("fetch_attempts_total").increment(1);
}

/// Record the final outcome of one fetch ("downloaded", "reused", "placeholder", ...)
pub fn record_fetch_outcome(outcome: &'static str, duration: Duration) {
    metrics::counter!("fetch_outcomes_total", "outcome" => outcome).increment(1);
    metrics::histogram!("fetch_duration_seconds").record(duration.as_secs_f64());
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(success: bool, duration: Duration, image_size: u64) {
    metrics::counter!("ocr_operations_total", "result" => if success { "success" } else { "failure" }).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Count one per-item result by label ("success" or a failure code)
pub fn record_extraction_result(label: &'static str) {
    metrics::counter!("extraction_results_total", "result" => label).increment(1);
}

/// Record batch-level metrics
pub fn record_batch_metrics(items: usize, duration: Duration) {
    metrics::counter!("batch_items_total").increment(items as u64);
    metrics::histogram!("batch_duration_seconds").record(duration.as_secs_f64());
}
