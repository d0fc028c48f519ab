//! Store stage (priority 620)
//!
//! Collects every sample reaching the end of the pipeline and writes them in
//! bounded batches. A batch failing on contention (busy or locked database) is
//! retried with exponential backoff; because writes are keyed upserts,
//! replaying a batch that partially landed is harmless. Any other store error
//! aborts the batch at once.

use crate::pipeline::{FileReport, Item, PipelineResult, RetryPolicy, Stage, StoredBatch};
use crate::store::error::StoreError;
use crate::store::sqlite::SampleStore;
use crate::store::types::RawSample;
use async_trait::async_trait;
use std::sync::Arc;

/// Batches samples into the sample store
pub struct StoreStage {
    store: Arc<dyn SampleStore>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl StoreStage {
    pub fn new(store: Arc<dyn SampleStore>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    async fn write_batch(&self, batch: &[RawSample]) -> Result<usize, StoreError> {
        let mut attempt = 1;

        loop {
            let store = self.store.clone();
            let rows = batch.to_vec();
            let result = tokio::task::spawn_blocking(move || store.upsert(&rows))
                .await
                .map_err(|e| StoreError::Lock(format!("store task failed: {}", e)))?;

            match result {
                Ok(written) => return Ok(written),
                Err(e) if !e.is_transient() => {
                    tracing::error!("Store batch of {} failed: {}", batch.len(), e);
                    return Err(e);
                }
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "Store batch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        batch.len(),
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Stage for StoreStage {
    fn name(&self) -> &str {
        "store"
    }

    fn priority(&self) -> u16 {
        620
    }

    async fn process(&self, item: Item, report: &mut FileReport) -> PipelineResult<Vec<Item>> {
        self.process_batch(vec![item], report).await
    }

    async fn process_batch(
        &self,
        items: Vec<Item>,
        report: &mut FileReport,
    ) -> PipelineResult<Vec<Item>> {
        let mut samples = Vec::new();
        let mut out = Vec::new();

        for item in items {
            match item {
                Item::Sample(sample) => samples.push(sample),
                other => out.push(other),
            }
        }

        for batch in samples.chunks(self.batch_size) {
            let rows = self.write_batch(batch).await?;
            report.rows_stored += rows;
            out.push(Item::Stored(StoredBatch { rows }));
        }

        if !samples.is_empty() {
            tracing::info!("Stored {} rows from {}", report.rows_stored, report.file);
        }

        Ok(out)
    }
}
