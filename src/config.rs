//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default matching the behavior the archive's fair-use
//! limits call for, so running without a config file is the common case.
//!
//! ```yaml
//! api_url: https://api.pushshift.io/reddit/search/submission
//! data_dir: ./data
//! collector:
//!   page_size: 100
//!   page_delay: { min_secs: 5, max_secs: 10 }
//!   retry_delay: { min_secs: 15, max_secs: 30 }
//!   max_retries: 10        # ~ for unbounded
//!   stall_pages: 1
//!   checkpoint_every: 5    # ~ to only write at the end
//! articles:
//!   timeout_secs: 30
//! ```

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

pub const DEFAULT_API_URL: &str = "https://api.pushshift.io/reddit/search/submission";

/// Maximum number of records the archive returns per request.
pub const PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Submission search endpoint of the archive.
    pub api_url: String,
    /// Root directory holding one sub-directory per subreddit.
    pub data_dir: PathBuf,
    pub collector: CollectorConfig,
    pub articles: ArticleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            collector: CollectorConfig::default(),
            articles: ArticleConfig::default(),
        }
    }
}

/// Pacing and failure policy for the paginated collector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Records requested per page. Capped at [`PAGE_SIZE`].
    pub page_size: u32,
    /// Pause after every successful page.
    pub page_delay: DelayRange,
    /// Pause before retrying a failed request.
    pub retry_delay: DelayRange,
    /// Consecutive failed requests tolerated before giving up. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Consecutive empty or non-advancing pages tolerated before stopping.
    pub stall_pages: u32,
    /// Rewrite the raw checkpoint every N successful pages. `None` writes only at the end.
    pub checkpoint_every: Option<u32>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            page_delay: DelayRange::secs(5, 10),
            retry_delay: DelayRange::secs(15, 30),
            max_retries: Some(10),
            stall_pages: 1,
            checkpoint_every: Some(5),
        }
    }
}

/// Settings for the article text fetcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArticleConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
        }
    }
}

/// An inclusive range of whole seconds to pick a jittered delay from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl DelayRange {
    pub const fn secs(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// No delay at all.
    #[cfg(test)]
    pub const fn none() -> Self {
        Self::secs(0, 0)
    }

    /// Pick a uniformly random whole-second delay within the range.
    pub fn jitter(&self) -> Duration {
        let (lo, hi) = if self.min_secs <= self.max_secs {
            (self.min_secs, self.max_secs)
        } else {
            (self.max_secs, self.min_secs)
        };
        Duration::from_secs(rng().random_range(lo..=hi))
    }
}

impl Config {
    /// Load configuration from `path`, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Config::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config: Config =
                    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let page_size = self.collector.page_size;
        if page_size == 0 || page_size > PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "collector.page_size must be between 1 and {PAGE_SIZE}, got {page_size}"
            )));
        }
        if self.collector.checkpoint_every == Some(0) {
            return Err(ConfigError::Invalid(
                "collector.checkpoint_every must be positive".to_string(),
            ));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("api_url is not a URL: {e}")))?;
        Ok(())
    }
}
