//! Paginated collection of archived submissions.
//!
//! The collector walks a subreddit's history backward in time, one page at a
//! time, until it holds at least the requested number of non-removed
//! records.
//!
//! # Pagination
//!
//! 1. Request up to `page_size` records created before the cursor (no
//!    cursor on the first request)
//! 2. Drop removed records, append the rest in API order
//! 3. Move the cursor to the page's oldest `created_utc` minus one
//! 4. Pause for a jittered interval and repeat while the count is still at
//!    or below the target
//!
//! The cursor only ever moves backward. A page that is empty, or that would
//! not move the cursor, counts as a stall; after `stall_pages` of those in a
//! row the collector stops with what it has.
//!
//! Retrying failed requests is the [`ArchiveSource`]'s job (see
//! [`crate::api::RetryFetch`]); an error reaching the collector means the
//! source gave up.

use crate::api::{ArchiveSource, FetchError, PageQuery};
use crate::config::CollectorConfig;
use crate::models::{Cursor, Record};
use crate::progress::{ProgressReporter, Stage};
use crate::storage::SubredditStore;
use crate::utils::is_subreddit_name;
use std::fmt;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error, PartialEq)]
pub enum CollectError {
    #[error("subreddit name must not be empty")]
    EmptySubreddit,
    #[error("`{0}` is not a subreddit name")]
    InvalidSubreddit(String),
    #[error("target count must be positive")]
    ZeroTarget,
}

/// Why the collection loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// More than `target` records were accumulated.
    TargetReached,
    /// The archive returned an empty page: no older history.
    Exhausted,
    /// Pages stopped moving the cursor backward.
    Stalled { cursor: Option<Cursor> },
    /// The source gave up on a request.
    RetriesExhausted { attempts: u32, error: String },
}

impl StopReason {
    /// Whether the collection met its target.
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::TargetReached)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => f.write_str("target reached"),
            StopReason::Exhausted => f.write_str("archive exhausted"),
            StopReason::Stalled { cursor: Some(c) } => write!(f, "stalled at cursor {c}"),
            StopReason::Stalled { cursor: None } => f.write_str("stalled before first page"),
            StopReason::RetriesExhausted { attempts, error } => {
                write!(f, "gave up after {attempts} attempts: {error}")
            }
        }
    }
}

/// Result of one collection run.
#[derive(Debug, Clone)]
pub struct Collection {
    pub subreddit: String,
    pub target: usize,
    /// Accumulated non-removed records, newest first.
    pub records: Vec<Record>,
    pub stop: StopReason,
    /// Successful pages appended.
    pub pages: usize,
    pub removed: usize,
    pub malformed: usize,
    /// Cursor after the last appended page.
    pub cursor: Option<Cursor>,
}

/// Drives cursor pagination against an [`ArchiveSource`].
pub struct Collector<'a, S, P> {
    source: &'a S,
    config: &'a CollectorConfig,
    progress: &'a P,
    checkpoint: Option<&'a SubredditStore>,
}

impl<'a, S, P> Collector<'a, S, P>
where
    S: ArchiveSource,
    P: ProgressReporter,
{
    pub fn new(source: &'a S, config: &'a CollectorConfig, progress: &'a P) -> Self {
        Self {
            source,
            config,
            progress,
            checkpoint: None,
        }
    }

    /// Periodically rewrite the raw checkpoint in `store` while collecting.
    pub fn with_checkpoints(mut self, store: &'a SubredditStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Collect at least `target` non-removed records from `subreddit`.
    ///
    /// The result may hold more than `target` records since whole pages are
    /// appended. It holds fewer only when the stop reason says so.
    ///
    /// # Arguments
    ///
    /// * `subreddit` - Plain subreddit name, letters, digits and underscores
    /// * `target` - Minimum number of non-removed records, at least 1
    ///
    /// # Returns
    ///
    /// The [`Collection`], including partial ones, or a [`CollectError`] for
    /// bad input. Fetch failures never surface as errors; they end the loop
    /// with [`StopReason::RetriesExhausted`].
    #[instrument(level = "info", skip(self))]
    pub async fn collect(&self, subreddit: &str, target: usize) -> Result<Collection, CollectError> {
        if subreddit.trim().is_empty() {
            return Err(CollectError::EmptySubreddit);
        }
        if !is_subreddit_name(subreddit) {
            return Err(CollectError::InvalidSubreddit(subreddit.to_string()));
        }
        if target == 0 {
            return Err(CollectError::ZeroTarget);
        }

        let mut records: Vec<Record> = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0usize;
        let mut removed = 0usize;
        let mut malformed = 0usize;
        let mut stalls = 0u32;
        let stall_limit = self.config.stall_pages.max(1);

        let stop = loop {
            if records.len() > target {
                break StopReason::TargetReached;
            }

            let query = PageQuery {
                subreddit: subreddit.to_string(),
                size: self.config.page_size,
                before: cursor,
            };
            let page = match self.source.fetch_page(&query).await {
                Ok(page) => page,
                Err(FetchError::Exhausted { attempts, last }) => {
                    break StopReason::RetriesExhausted {
                        attempts,
                        error: last.to_string(),
                    };
                }
                Err(e) => {
                    break StopReason::RetriesExhausted {
                        attempts: 1,
                        error: e.to_string(),
                    };
                }
            };

            let next = Cursor::after(&page);
            let advances = match (next, cursor) {
                (Some(next), Some(current)) => next < current,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if page.is_empty() || !advances {
                stalls += 1;
                warn!(
                    stalls,
                    limit = stall_limit,
                    empty = page.is_empty(),
                    cursor = ?cursor,
                    "Page did not move the cursor"
                );
                if stalls >= stall_limit {
                    break if page.is_empty() {
                        StopReason::Exhausted
                    } else {
                        StopReason::Stalled { cursor }
                    };
                }
                sleep(self.config.page_delay.jitter()).await;
                continue;
            }
            stalls = 0;

            let page_removed = page.records.iter().filter(|r| r.is_removed()).count();
            removed += page_removed;
            malformed += page.malformed;
            records.extend(page.records.into_iter().filter(|r| !r.is_removed()));
            cursor = next;
            pages += 1;

            if let Some(c) = cursor {
                debug!(page = pages, removed = page_removed, cursor = %c, "Appended page");
            }
            self.progress.report(Stage::Collect, records.len(), target);
            self.maybe_checkpoint(pages, &records).await;

            if records.len() <= target {
                sleep(self.config.page_delay.jitter()).await;
            }
        };

        info!(
            subreddit,
            collected = records.len(),
            target,
            pages,
            removed,
            malformed,
            stop = %stop,
            "Collection finished"
        );

        Ok(Collection {
            subreddit: subreddit.to_string(),
            target,
            records,
            stop,
            pages,
            removed,
            malformed,
            cursor,
        })
    }

    async fn maybe_checkpoint(&self, pages: usize, records: &[Record]) {
        let (Some(store), Some(every)) = (self.checkpoint, self.config.checkpoint_every) else {
            return;
        };
        if pages % every as usize != 0 {
            return;
        }
        if let Err(e) = store.save_records(records).await {
            warn!(error = %e, pages, "Intermediate checkpoint failed");
        }
    }
}
