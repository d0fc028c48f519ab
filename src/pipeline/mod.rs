//! Decode Pipeline
//!
//! Turns one listing entry into stored samples through a fixed sequence of
//! stages, ordered by numeric priority:
//!
//! ```text
//! Entry -> [101 download] -> Payload -> [302 decompress] -> Payload
//!       -> [310 text decode] -> Document -> [320 record split] -> Record
//!       -> [405 transform] -> Sample -> [620 store] -> Stored
//! ```
//!
//! A stage may pass an item through, transform it, fan it out or drop it. A
//! record-level error drops that record only; any other error aborts the file.

pub mod error;
pub mod fetch;
pub mod retry;
pub mod stages;

pub use error::{FetchError, PipelineError, PipelineResult, RETRY_HTTP_CODES};
pub use fetch::{Fetcher, MemoryFetcher, RetryFetcher};
pub use retry::RetryPolicy;
pub use stages::{
    DecompressStage, DownloadStage, RecordMapping, RecordSplitStage, TextDecodeStage,
    TransformStage,
};

use crate::listing::DirectoryEntry;
use crate::store::RawSample;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of work flowing between stages
#[derive(Debug, Clone)]
pub enum Item {
    /// Listing entry to download
    Entry(DirectoryEntry),
    /// Raw bytes, possibly compressed
    Payload {
        name: String,
        source: String,
        bytes: Vec<u8>,
    },
    /// Decoded text file
    Document { name: String, text: String },
    /// One tabular row
    Record(TableRecord),
    /// One decoded sample ready for storage
    Sample(RawSample),
    /// Confirmation of a committed batch
    Stored(StoredBatch),
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Entry(_) => "entry",
            Item::Payload { .. } => "payload",
            Item::Document { .. } => "document",
            Item::Record(_) => "record",
            Item::Sample(_) => "sample",
            Item::Stored(_) => "stored",
        }
    }
}

/// A row from a tabular file, keyed by uppercased column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    /// Table name, e.g. `DISPATCH_UNIT_SCADA`
    pub table: String,
    /// File the row came from
    pub source: String,
    /// 1-based row number within the file
    pub line: usize,
    pub fields: HashMap<String, String>,
}

impl TableRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(&field.to_uppercase()).map(String::as_str)
    }
}

/// Rows committed by one store batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBatch {
    pub rows: usize,
}

/// Per-file tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub records_dropped: usize,
    pub samples_decoded: usize,
    pub rows_stored: usize,
    /// Entities whose decoded intervals do not cover their window
    pub coverage_gaps: usize,
}

impl FileReport {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }
}

/// One pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Position in the pipeline; lower runs first
    fn priority(&self) -> u16;

    /// Process one item. An empty result drops it.
    async fn process(&self, item: Item, report: &mut FileReport) -> PipelineResult<Vec<Item>>;

    /// Process all items produced by the previous stage
    async fn process_batch(
        &self,
        items: Vec<Item>,
        report: &mut FileReport,
    ) -> PipelineResult<Vec<Item>> {
        process_each(self, items, report).await
    }
}

/// Run `stage.process` over every item, absorbing record-level errors
pub async fn process_each<S>(
    stage: &S,
    items: Vec<Item>,
    report: &mut FileReport,
) -> PipelineResult<Vec<Item>>
where
    S: Stage + ?Sized,
{
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        match stage.process(item, report).await {
            Ok(produced) => out.extend(produced),
            Err(e) if e.is_record_level() => {
                tracing::warn!("{} dropped a record from {}: {}", stage.name(), report.file, e);
                report.records_dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

/// Assembles stages into a pipeline
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Freeze the stage order. Stages with equal priority keep insertion order.
    pub fn build(mut self) -> Pipeline {
        self.stages.sort_by_key(|s| s.priority());
        Pipeline {
            stages: self.stages,
        }
    }
}

/// A fixed, priority-ordered sequence of stages
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one listing entry through every stage
    pub async fn run(&self, entry: DirectoryEntry) -> PipelineResult<FileReport> {
        let mut report = FileReport::new(entry.filename.clone());
        let mut items = vec![Item::Entry(entry)];

        for stage in &self.stages {
            if items.is_empty() {
                break;
            }
            items = stage.process_batch(items, &mut report).await?;
            tracing::trace!("{} produced {} items", stage.name(), items.len());
        }

        Ok(report)
    }
}
