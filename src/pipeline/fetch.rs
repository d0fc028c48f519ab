//! Document fetching
//!
//! `Fetcher` is the seam between the pipeline and the network. The HTTP
//! implementation lives with the crawler; `RetryFetcher` adds the retry
//! budget on top of any fetcher, and `MemoryFetcher` serves canned documents.

use crate::pipeline::error::FetchError;
use crate::pipeline::retry::RetryPolicy;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fetches one remote document
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Retries retryable failures of the inner fetcher with exponential backoff
pub struct RetryFetcher {
    inner: Arc<dyn Fetcher>,
    policy: RetryPolicy,
}

impl RetryFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Fetcher for RetryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        "Fetch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.policy.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serves documents from memory. Failures can be queued per URL and are
/// returned before the document itself.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(url.into(), body.into());
        }
    }

    pub fn fail_next(&self, url: impl Into<String>, error: FetchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(url.into()).or_default().push_back(error);
        }
    }

    /// Number of fetch calls served, including failures
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(url).and_then(|q| q.pop_front()));
        if let Some(error) = queued {
            return Err(error);
        }

        self.documents
            .lock()
            .ok()
            .and_then(|documents| documents.get(url).cloned())
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
