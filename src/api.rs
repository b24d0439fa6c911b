//! Archival search API access with flat-jitter retry logic.
//!
//! This module provides the interface the collector uses to pull pages of
//! submissions from the archive. It mirrors the archive's fair-use rules:
//! failed requests are retried after a long randomized pause rather than
//! hammered.
//!
//! # Architecture
//!
//! The module uses a trait-based design:
//! - [`ArchiveSource`]: Core trait defining one page request
//! - [`PushshiftClient`]: `reqwest` implementation against the real endpoint
//! - [`RetryFetch`]: Decorator that retries any `ArchiveSource` on failure
//!
//! # Retry Strategy
//!
//! - Every failure (non-200 status, transport error, undecodable body) is
//!   treated as transient
//! - The same request is repeated; the cursor never moves on failure
//! - Delay is drawn uniformly from the configured range (15-30s by default)
//!   with no growth between attempts
//! - An optional ceiling on consecutive failures; without one the decorator
//!   retries forever

use crate::config::{CollectorConfig, DelayRange};
use crate::models::{ApiResponse, Cursor, Page};
use crate::utils::truncate_for_log;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Parameters of a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub subreddit: String,
    pub size: u32,
    /// Only return submissions created strictly before this timestamp.
    pub before: Option<Cursor>,
}

impl PageQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("subreddit", self.subreddit.clone()),
            ("size", self.size.to_string()),
        ];
        if let Some(Cursor(before)) = self.before {
            params.push(("before", before.to_string()));
        }
        params
    }
}

/// Failure of a single page request. All variants except
/// [`FetchError::Exhausted`] are considered transient.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("archive returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode archive response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("gave up after {attempts} failed attempts; last error: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

/// A source of archived submission pages.
///
/// Implementors return one decoded page per call, or an error describing
/// why the page could not be obtained. Decorators like [`RetryFetch`] can
/// be layered on top.
pub trait ArchiveSource {
    /// Request one page of submissions.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError>;
}

/// HTTP client for the Pushshift submission search endpoint.
#[derive(Debug, Clone)]
pub struct PushshiftClient {
    client: Client,
    endpoint: String,
}

impl PushshiftClient {
    /// Create a client for the search endpoint at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl ArchiveSource for PushshiftClient {
    #[instrument(level = "info", skip_all, fields(subreddit = %query.subreddit, before = ?query.before))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query.params())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let dt = t0.elapsed();

        if status != StatusCode::OK {
            warn!(%status, elapsed_ms = dt.as_millis() as u64, "Archive request failed");
            return Err(FetchError::Status {
                status,
                body: truncate_for_log(&body, 200),
            });
        }

        let decoded: ApiResponse = serde_json::from_str(&body)?;
        let page = Page::from_response(decoded);
        debug!(
            records = page.records.len(),
            malformed = page.malformed,
            elapsed_ms = dt.as_millis() as u64,
            "Fetched archive page"
        );
        Ok(page)
    }
}

/// Wrapper that retries any [`ArchiveSource`] after a jittered pause.
pub struct RetryFetch<T> {
    /// The underlying source to wrap.
    inner: T,
    /// Consecutive failures tolerated; `None` means never give up.
    max_retries: Option<u32>,
    /// Range the pause before each retry is drawn from.
    delay: DelayRange,
}

impl<T> RetryFetch<T>
where
    T: ArchiveSource,
{
    /// Create a new retry wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The source to wrap
    /// * `max_retries` - Consecutive retries before giving up; `None` retries forever
    /// * `delay` - Range the pause before each retry is drawn from
    pub fn new(inner: T, max_retries: Option<u32>, delay: DelayRange) -> Self {
        Self {
            inner,
            max_retries,
            delay,
        }
    }

    /// Build the wrapper from the collector section of the config.
    pub fn from_config(inner: T, config: &CollectorConfig) -> Self {
        Self::new(inner, config.max_retries, config.retry_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<T> ArchiveSource for RetryFetch<T>
where
    T: ArchiveSource,
{
    #[instrument(level = "info", skip_all, fields(before = ?query.before))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.inner.fetch_page(query).await {
                Ok(page) => {
                    if attempt > 0 {
                        info!(attempt, "Archive request recovered");
                    }
                    return Ok(page);
                }
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if self.max_retries.is_some_and(|max| attempt > max) {
                        error!(
                            attempt,
                            max = ?self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch_page() exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.delay.jitter();
                    warn!(
                        attempt,
                        max = ?self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch_page() attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
