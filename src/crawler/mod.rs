//! Crawl Orchestration
//!
//! Runs one source end to end:
//!
//! ```text
//! lock source -> load cursor -> fetch + parse listings -> select
//!     -> pipeline per entry (bounded pool) -> advance + commit cursor
//! ```
//!
//! - **http**: `HttpFetcher`
//! - **throttle**: `AdaptiveThrottle`
//! - **error**: `CrawlError`
//!
//! Runs of the same source are serialized by a per-source lock so only one
//! run commits its cursor at a time. Different sources run independently.

pub mod error;
pub mod http;
pub mod throttle;

pub use error::{CrawlError, CrawlResult};
pub use http::HttpFetcher;
pub use throttle::AdaptiveThrottle;

use crate::config::{Config, SourceConfig};
use crate::frontier::{select, FrontierSettings, ProgressStore, SqliteProgressStore};
use crate::listing::{parse_listing, DirectoryEntry};
use crate::pipeline::{
    DecompressStage, DownloadStage, Fetcher, FileReport, Pipeline, PipelineResult,
    RecordSplitStage, RetryFetcher, RetryPolicy, TextDecodeStage, TransformStage,
};
use crate::store::{SampleStore, SqliteSampleStore, StoreStage};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Url;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Instrument;
use uuid::Uuid;

/// Crawler-wide settings
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    /// Worker pool size when the source does not override it
    pub concurrency: usize,
    pub batch_size: usize,
    pub store_retry: RetryPolicy,
    pub memory_guard_bytes: u64,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_size: 1000,
            store_retry: RetryPolicy::default(),
            memory_guard_bytes: 512 * 1024 * 1024,
        }
    }
}

impl CrawlerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.crawler.concurrency.max(1),
            batch_size: config.storage.batch_size,
            store_retry: config.storage.retry_policy(),
            memory_guard_bytes: config.crawler.memory_guard_bytes,
        }
    }
}

/// A file that could not be ingested
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of one crawl run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub source: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listings: usize,
    pub listings_failed: usize,
    /// Listing lines that did not parse
    pub lines_skipped: usize,
    pub entries_listed: usize,
    /// Files ingested
    pub parsed: usize,
    /// Entries not selected
    pub skipped: usize,
    /// Files that failed
    pub failed: usize,
    pub rows_stored: usize,
    pub records_dropped: usize,
    pub coverage_gaps: usize,
    pub cursor: Option<NaiveDateTime>,
    pub failures: Vec<FileFailure>,
}

impl CrawlSummary {
    fn new(source: &str, run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            source: source.to_string(),
            run_id: run_id.to_string(),
            started_at: now,
            finished_at: now,
            listings: 0,
            listings_failed: 0,
            lines_skipped: 0,
            entries_listed: 0,
            parsed: 0,
            skipped: 0,
            failed: 0,
            rows_stored: 0,
            records_dropped: 0,
            coverage_gaps: 0,
            cursor: None,
            failures: Vec::new(),
        }
    }

    fn add_report(&mut self, report: &FileReport) {
        self.parsed += 1;
        self.rows_stored += report.rows_stored;
        self.records_dropped += report.records_dropped;
        self.coverage_gaps += report.coverage_gaps;
    }
}

/// Crawls configured sources into the sample store
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    samples: Arc<dyn SampleStore>,
    progress: Arc<dyn ProgressStore>,
    settings: CrawlerSettings,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        samples: Arc<dyn SampleStore>,
        progress: Arc<dyn ProgressStore>,
        settings: CrawlerSettings,
    ) -> Self {
        Self {
            fetcher,
            samples,
            progress,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// HTTP fetcher with retries, SQLite stores at the configured path
    pub fn from_config(config: &Config) -> CrawlResult<Self> {
        let path = config.storage.database_path();
        let http = Arc::new(HttpFetcher::new(&config.crawler)?);
        let fetcher = Arc::new(RetryFetcher::new(http, config.crawler.retry_policy()));

        Ok(Self::new(
            fetcher,
            Arc::new(SqliteSampleStore::open(&path)?),
            Arc::new(SqliteProgressStore::open(&path)?),
            CrawlerSettings::from_config(config),
        ))
    }

    pub fn samples(&self) -> &Arc<dyn SampleStore> {
        &self.samples
    }

    fn source_lock(&self, source: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(source.to_string()).or_default().clone(),
            // A poisoned map still hands out a lock; it just is not shared
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The fixed stage sequence for a source
    pub fn pipeline_for(&self, source: &SourceConfig) -> Pipeline {
        let guard = self.settings.memory_guard_bytes;

        Pipeline::builder()
            .stage(Arc::new(DownloadStage::new(self.fetcher.clone(), guard)))
            .stage(Arc::new(DecompressStage::new(guard)))
            .stage(Arc::new(TextDecodeStage::new()))
            .stage(Arc::new(RecordSplitStage::new()))
            .stage(Arc::new(TransformStage::new(source.mappings.clone(), source.network)))
            .stage(Arc::new(StoreStage::new(
                self.samples.clone(),
                self.settings.batch_size,
                self.settings.store_retry,
            )))
            .build()
    }

    /// Fetch and parse every listing page of the source
    async fn list(&self, source: &SourceConfig, summary: &mut CrawlSummary) -> Vec<DirectoryEntry> {
        let mut entries = Vec::new();

        for start_url in &source.start_urls {
            summary.listings += 1;

            let url = match Url::parse(start_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!("Invalid start url {}: {}", start_url, e);
                    summary.listings_failed += 1;
                    continue;
                }
            };

            match self.fetcher.fetch(url.as_str()).await {
                Ok(body) => {
                    let listing = parse_listing(&String::from_utf8_lossy(&body), source.dialect, &url);
                    summary.lines_skipped += listing.skipped;
                    entries.extend(listing.entries);
                }
                Err(e) => {
                    tracing::error!("Failed to fetch listing {}: {}", url, e);
                    summary.listings_failed += 1;
                }
            }
        }

        summary.entries_listed = entries.len();
        entries
    }

    /// Crawl one source
    pub async fn run(&self, source: &SourceConfig) -> CrawlResult<CrawlSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("crawl", source = %source.name, run_id = %run_id);

        self.run_inner(source, run_id).instrument(span).await
    }

    async fn run_inner(&self, source: &SourceConfig, run_id: Uuid) -> CrawlResult<CrawlSummary> {
        let lock = self.source_lock(&source.name);
        let _guard = lock.lock().await;

        let mut summary = CrawlSummary::new(&source.name, run_id);
        let settings = FrontierSettings::from_source(source)?;
        let mut progress = self.progress.load(&source.name)?;

        tracing::info!("Starting crawl (cursor {:?})", progress.latest_processed);

        let entries = self.list(source, &mut summary).await;
        if summary.listings > 0 && summary.listings_failed == summary.listings {
            return Err(CrawlError::NoListings(source.name.clone()));
        }

        let selection = select(entries, progress.latest_processed, &settings);
        summary.skipped = selection.skipped;

        let pipeline = self.pipeline_for(source);
        let concurrency = source.concurrency.unwrap_or(self.settings.concurrency).max(1);

        let results: Vec<(String, Option<NaiveDateTime>, PipelineResult<FileReport>)> =
            stream::iter(selection.emitted)
                .map(|entry| {
                    let pipeline = pipeline.clone();
                    async move {
                        let file = entry.filename.clone();
                        let timestamp = entry.timestamp();
                        (file, timestamp, pipeline.run(entry).await)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut committed = Vec::new();
        let mut earliest_failure: Option<NaiveDateTime> = None;
        for (file, timestamp, result) in results {
            match result {
                Ok(report) => {
                    summary.add_report(&report);
                    committed.extend(timestamp);
                }
                Err(e) => {
                    tracing::error!("Failed to ingest {}: {}", file, e);
                    if let Some(ts) = timestamp {
                        earliest_failure = Some(earliest_failure.map_or(ts, |f| f.min(ts)));
                    }
                    summary.failed += 1;
                    summary.failures.push(FileFailure {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }

        // The cursor must stay below a failed file or the next run filters it out
        if let Some(failure) = earliest_failure {
            committed.retain(|ts| *ts < failure);
            tracing::warn!("Holding cursor below failed entry at {}", failure);
        }

        if progress.advance(committed) {
            self.progress.commit(&progress)?;
        }
        summary.cursor = progress.latest_processed;
        summary.finished_at = Utc::now();

        tracing::info!(
            "Crawl finished: {} parsed, {} skipped, {} failed, {} rows stored",
            summary.parsed,
            summary.skipped,
            summary.failed,
            summary.rows_stored
        );

        Ok(summary)
    }

    /// Crawl several sources concurrently
    pub async fn run_all(&self, sources: &[SourceConfig]) -> Vec<CrawlResult<CrawlSummary>> {
        futures_util::future::join_all(sources.iter().map(|s| self.run(s))).await
    }
}
