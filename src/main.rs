use anyhow::{Context, Result};
use label_measure::config::AppConfig;
use label_measure::dataset;
use label_measure::errors::error_logging;
use label_measure::instance_manager::TesseractEngine;
use label_measure::observability;
use label_measure::{
    BatchOrchestrator, ImageFetcher, MeasurementParser, TextExtractor, UnitVocabulary,
};
use std::sync::Arc;
use tracing::info;

/// Load the unit vocabulary: the override file when configured, built-in tables otherwise
fn load_vocabulary(config: &AppConfig) -> Result<UnitVocabulary> {
    match &config.vocabulary_path {
        Some(path) => UnitVocabulary::load(path).map_err(|e| {
            error_logging::log_config_error(&e, "UNIT_VOCABULARY_PATH", "load_vocabulary");
            anyhow::anyhow!("Unit vocabulary could not be loaded: {}", e)
        }),
        None => {
            info!("Using built-in unit vocabulary");
            Ok(UnitVocabulary::builtin())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    let guard = observability::init_observability_with_config(&config.observability).await?;
    info!("{}", config.summary());

    let vocabulary = Arc::new(load_vocabulary(&config)?);
    let parser = Arc::new(
        MeasurementParser::new(Arc::clone(&vocabulary))
            .context("Failed to compile unit patterns")?,
    );

    let engine = TesseractEngine::new(config.ocr.clone())
        .map_err(|e| anyhow::anyhow!("OCR engine initialization failed: {}", e))?;
    let extractor = Arc::new(TextExtractor::new(Arc::new(engine), &config.ocr));
    let fetcher = Arc::new(ImageFetcher::new(config.fetch.clone())?);

    let rows = dataset::read_rows(&config.dataset.input_path)?;
    let items = rows.iter().map(dataset::InputRow::work_item).collect();

    let orchestrator = BatchOrchestrator::new(
        Arc::clone(&fetcher),
        extractor,
        parser,
        config.batch.clone(),
    )?;
    let report = orchestrator.run(items).await;

    let output = dataset::output_rows(&rows, &report.results)?;
    dataset::write_predictions(&config.dataset.output_path, &output)?;

    let stats = fetcher.stats();
    info!(
        total = report.summary.total,
        succeeded = report.summary.succeeded,
        failed = report.summary.failed(),
        downloads = stats.downloads,
        reuses = stats.reuses,
        placeholders = stats.placeholders,
        output = %config.dataset.output_path.display(),
        "Run complete"
    );
    for (code, count) in &report.summary.failures {
        info!(code = %code, count, "Failure breakdown");
    }

    if let (Some(handle), Some(path)) = (
        guard.metrics_handle(),
        config.observability.metrics_output_path.as_deref(),
    ) {
        observability::write_metrics_snapshot(handle, path)?;
    }
    guard.shutdown();

    Ok(())
}
