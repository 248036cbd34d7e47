//! # Batch Orchestrator Module
//!
//! Runs fetch → extract → parse for every (url, attribute) pair on a bounded
//! pool of tokio tasks and returns one [`ExtractionResult`] per input, in
//! input order.
//!
//! ## Features
//!
//! - Concurrency bounded by a semaphore of `worker_count` permits
//! - OCR runs on the blocking pool so it never stalls network I/O
//! - Results are index-tagged; completion order does not matter
//! - No failure aborts the batch: a panicking task still yields a row
//! - Progress logged every [`PROGRESS_INTERVAL`] completed items
//! - Without image retention, a downloaded file is deleted only once the last
//!   in-flight item using it has finished

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::config::BatchConfig;
use crate::errors::{error_logging, AppResult};
use crate::fetcher::ImageFetcher;
use crate::measurement::{parse_prediction, ExtractionResult, FailureCode, Measurement};
use crate::observability;
use crate::ocr::TextExtractor;
use crate::text_processing::MeasurementParser;
use crate::units::Attribute;

/// Completed items between two progress log lines
pub const PROGRESS_INTERVAL: usize = 100;

/// One row of work: an image location and the attribute to read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub url: String,
    pub attribute: String,
}

impl WorkItem {
    pub fn new(url: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attribute: attribute.into(),
        }
    }
}

/// Aggregate counts for a finished batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: BTreeMap<FailureCode, usize>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl BatchSummary {
    pub fn from_results(
        results: &[ExtractionResult],
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut failures = BTreeMap::new();
        let mut succeeded = 0;
        for result in results {
            match result.failure_code() {
                None => succeeded += 1,
                Some(code) => *failures.entry(code).or_insert(0) += 1,
            }
        }
        Self {
            total: results.len(),
            succeeded,
            failures,
            started_at,
            duration,
        }
    }

    /// Number of rows that ended with `code`
    pub fn count(&self, code: FailureCode) -> usize {
        self.failures.get(&code).copied().unwrap_or(0)
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Results in input order plus their summary
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<ExtractionResult>,
    pub summary: BatchSummary,
}

/// The three stages, shared by every task
struct Pipeline {
    fetcher: Arc<ImageFetcher>,
    extractor: Arc<TextExtractor>,
    parser: Arc<MeasurementParser>,
    retain_images: bool,
    leases: ImageLeases,
}

/// In-flight holder counts per downloaded file. Rows sharing an image link
/// share one file, so it may only go away with its last holder.
#[derive(Default)]
struct ImageLeases {
    holders: Mutex<HashMap<PathBuf, usize>>,
}

impl ImageLeases {
    fn acquire(&self, path: PathBuf) -> ImageLease<'_> {
        *self.holders.lock().entry(path.clone()).or_insert(0) += 1;
        ImageLease { leases: self, path }
    }

    #[cfg(test)]
    fn holders(&self, path: &Path) -> usize {
        self.holders.lock().get(path).copied().unwrap_or(0)
    }
}

/// Released on drop, including when the item's task unwinds
struct ImageLease<'a> {
    leases: &'a ImageLeases,
    path: PathBuf,
}

impl Drop for ImageLease<'_> {
    fn drop(&mut self) {
        let mut holders = self.leases.holders.lock();
        let last = match holders.get_mut(&self.path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                holders.remove(&self.path);
                true
            }
            None => false,
        };
        // Removed under the lock so a new holder either keeps the file or refetches it
        if last {
            remove_image(&self.path);
        }
    }
}

/// Fans work items out over a bounded pool of tasks
pub struct BatchOrchestrator {
    pipeline: Arc<Pipeline>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        fetcher: Arc<ImageFetcher>,
        extractor: Arc<TextExtractor>,
        parser: Arc<MeasurementParser>,
        config: BatchConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            pipeline: Arc::new(Pipeline {
                fetcher,
                extractor,
                parser,
                retain_images: config.retain_images,
                leases: ImageLeases::default(),
            }),
            config,
        })
    }

    /// Process every item; the result has the same length and order as `items`
    pub async fn run(&self, items: Vec<WorkItem>) -> BatchReport {
        let total = items.len();
        let span = observability::batch_span(total);
        self.run_inner(items).instrument(span).await
    }

    async fn run_inner(&self, items: Vec<WorkItem>) -> BatchReport {
        let total = items.len();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(items = total, workers = self.config.worker_count, "Batch started");

        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let permit = Arc::clone(&semaphore).acquire_owned();
            let handle = tasks.spawn(
                async move {
                    let _permit = match permit.await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error_logging::log_internal_error(&e, "batch", "acquire_worker", Some(index));
                            return (index, ExtractionResult::Failed(FailureCode::DownloadFailed));
                        }
                    };
                    let result = process_item(&pipeline, &item).await;
                    (index, result)
                }
                .instrument(observability::item_span(index)),
            );
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<ExtractionResult>> = vec![None; total];
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, result) = match joined {
                Ok((_, (index, result))) => (index, result),
                Err(e) => {
                    // Fetch runs directly on the task, so a panic here is a download failure
                    let Some(&index) = task_index.get(&e.id()) else {
                        error_logging::log_internal_error(&e, "batch", "join_task", None);
                        continue;
                    };
                    error_logging::log_internal_error(&e, "batch", "item_task", Some(index));
                    (index, ExtractionResult::Failed(FailureCode::DownloadFailed))
                }
            };

            observability::record_extraction_result(result.label());
            slots[index] = Some(result);

            completed += 1;
            if completed % PROGRESS_INTERVAL == 0 || completed == total {
                info!(completed, total, "Batch progress");
            }
        }

        let results: Vec<ExtractionResult> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(ExtractionResult::Failed(FailureCode::DownloadFailed)))
            .collect();

        let duration = start.elapsed();
        observability::record_batch_metrics(total, duration);
        let summary = BatchSummary::from_results(&results, started_at, duration);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            duration_ms = duration.as_millis() as u64,
            "Batch finished"
        );

        BatchReport { results, summary }
    }
}

/// fetch → extract → parse for one item
async fn process_item(pipeline: &Pipeline, item: &WorkItem) -> ExtractionResult {
    let Ok(attribute) = item.attribute.parse::<Attribute>() else {
        debug!(attribute = %item.attribute, "Skipping unsupported attribute");
        return ExtractionResult::Failed(FailureCode::UnsupportedAttribute);
    };

    let download_dir = pipeline.fetcher.config().download_dir.clone();
    let _lease = if pipeline.retain_images {
        None
    } else {
        ImageFetcher::destination_path(&item.url, &download_dir)
            .ok()
            .map(|dest| pipeline.leases.acquire(dest))
    };
    let fetched = match pipeline.fetcher.fetch(&item.url, &download_dir).await {
        Ok(fetched) => fetched,
        Err(e) => {
            debug!(url = %item.url, error = %e, "Fetch failed");
            return ExtractionResult::Failed(FailureCode::DownloadFailed);
        }
    };
    let image_path = fetched.path().to_path_buf();

    if !image_path.is_file() {
        warn!(path = %image_path.display(), "Fetched image disappeared before extraction");
        return ExtractionResult::Failed(FailureCode::DownloadFailed);
    }

    let extractor = Arc::clone(&pipeline.extractor);
    let ocr_path = image_path.clone();
    match tokio::task::spawn_blocking(move || extractor.extract(&ocr_path)).await {
        Ok(text) if text.is_empty() => ExtractionResult::Failed(FailureCode::TextExtractionFailed),
        Ok(text) => {
            let parsed = pipeline.parser.parse_attribute(&text, attribute);
            verify_prediction(parsed, pipeline.parser.as_ref())
        }
        Err(e) => {
            error_logging::log_ocr_error(
                &e,
                "extract_text_task",
                Some(&image_path.display().to_string()),
                None,
                None,
            );
            ExtractionResult::Failed(FailureCode::TextExtractionFailed)
        }
    }
}

/// Re-read a found measurement through the prediction format; a measurement
/// whose formatted form does not round-trip becomes `invalid_unit`
fn verify_prediction(result: ExtractionResult, parser: &MeasurementParser) -> ExtractionResult {
    let ExtractionResult::Found(measurement) = result else {
        return result;
    };

    let formatted = measurement.to_string();
    match parse_prediction(&formatted, parser.vocabulary()) {
        Ok(Some((value, unit))) => match Measurement::new(value, unit) {
            Some(checked) => ExtractionResult::Found(checked),
            None => ExtractionResult::Failed(FailureCode::InvalidUnit),
        },
        Ok(None) => ExtractionResult::Failed(FailureCode::InvalidUnit),
        Err(e) => {
            debug!(prediction = %formatted, error = %e, "Prediction failed format check");
            ExtractionResult::Failed(e.failure_code())
        }
    }
}

fn remove_image(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            error_logging::log_filesystem_error(
                &e,
                "remove_image",
                Some(&path.display().to_string()),
                None,
            );
        }
    }
}
