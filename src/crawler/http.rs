//! HTTP fetcher
//!
//! One attempt per call; wrap in `RetryFetcher` for the retry budget. Every
//! response, including failures, feeds the adaptive throttle.
//!
//! Bodies are read chunk by chunk and abandoned once they pass the memory
//! guard, so an oversized or unbounded response never lands in memory whole.

use crate::config::CrawlerConfig;
use crate::crawler::error::{CrawlError, CrawlResult};
use crate::crawler::throttle::AdaptiveThrottle;
use crate::pipeline::{FetchError, Fetcher};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;

/// Fetches documents over HTTP
pub struct HttpFetcher {
    client: Client,
    throttle: Option<AdaptiveThrottle>,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> CrawlResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CrawlError::Client(e.to_string()))?;

        let throttle = config
            .throttle
            .enabled
            .then(|| AdaptiveThrottle::from_config(&config.throttle));

        Ok(Self {
            client,
            throttle,
            max_bytes: config.memory_guard_bytes,
        })
    }

    /// Override the largest body accepted
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn too_large(&self, url: &str, size: u64) -> FetchError {
        tracing::warn!("Refusing {}: {} bytes over limit of {}", url, size, self.max_bytes);
        FetchError::TooLarge {
            url: url.to_string(),
            size,
            limit: self.max_bytes,
        }
    }

    fn classify(url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = error.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(self.too_large(url, length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| Self::classify(url, e))? {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(self.too_large(url, size));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let started = Instant::now();
        let result = self.get(url).await;

        if let Some(throttle) = &self.throttle {
            throttle.record(started.elapsed(), result.is_ok());
        }

        tracing::debug!("GET {} took {:?}", url, started.elapsed());
        result
    }
}
