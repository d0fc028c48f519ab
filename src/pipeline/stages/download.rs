//! Download stage (priority 101)

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::{FileReport, Item, Stage};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetches each listing entry's link into a payload
pub struct DownloadStage {
    fetcher: Arc<dyn Fetcher>,
    max_bytes: u64,
}

impl DownloadStage {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_bytes: u64) -> Self {
        Self { fetcher, max_bytes }
    }
}

#[async_trait]
impl Stage for DownloadStage {
    fn name(&self) -> &str {
        "download"
    }

    fn priority(&self) -> u16 {
        101
    }

    async fn process(&self, item: Item, _report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        let entry = match item {
            Item::Entry(entry) => entry,
            other => return Ok(vec![other]),
        };

        tracing::info!("Getting {}", entry.link);
        let bytes = self.fetcher.fetch(&entry.link).await?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(PipelineError::MemoryGuard {
                file: entry.filename,
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        Ok(vec![Item::Payload {
            name: entry.filename,
            source: entry.link,
            bytes,
        }])
    }
}
