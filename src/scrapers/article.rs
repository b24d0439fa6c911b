//! Best-effort article text extraction.
//!
//! Submissions usually link to a news article. This module downloads the
//! linked page and pulls out the body paragraphs, preferring the page's
//! `<article>` element, then `<main>`, then any paragraph on the page.
//!
//! A failure for one URL never aborts the batch: [`fetch_articles`] turns
//! every failure into an absent value at the same position.

use crate::config::ArticleConfig;
use crate::progress::{ProgressReporter, Stage};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

static PARAGRAPH_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article p", "main p", "p"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("page returned HTTP {0}")]
    Status(StatusCode),
    #[error("page is not HTML ({0})")]
    NotHtml(String),
    #[error("no article text found")]
    NoText,
}

/// Turns a URL into the main text of the article behind it.
pub trait ArticleExtractor {
    async fn extract(&self, url: &str) -> Result<String, ExtractError>;
}

/// Downloads pages over HTTP and extracts their paragraph text.
#[derive(Debug, Clone)]
pub struct HtmlArticleExtractor {
    client: Client,
}

impl HtmlArticleExtractor {
    pub fn new(config: &ArticleConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl ArticleExtractor for HtmlArticleExtractor {
    #[instrument(level = "debug", skip(self))]
    async fn extract(&self, url: &str) -> Result<String, ExtractError> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(ExtractError::NotHtml(content_type));
        }

        let body = response.text().await?;
        let text = extract_text(&body).ok_or(ExtractError::NoText)?;
        debug!(bytes = text.len(), "Parsed article");
        Ok(text)
    }
}

/// Pull the body paragraphs out of an HTML document.
///
/// Paragraph text is whitespace-normalized and joined with blank lines.
/// Returns `None` when no selector yields any non-empty paragraph.
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    PARAGRAPH_SELECTORS.iter().find_map(|selector| {
        let paragraphs: Vec<String> = document
            .select(selector)
            .map(|p| p.text().collect::<String>())
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .collect();
        (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
    })
}

/// Fetch article text for every URL, one at a time and in order.
///
/// The output has exactly one entry per input URL. Absent URLs and failed
/// extractions both yield `None` at their position.
///
/// # Arguments
///
/// * `extractor` - Source of article text
/// * `urls` - One entry per row; `None` for rows without a URL
/// * `progress` - Receives `(done, total)` after every URL
///
/// # Returns
///
/// Article texts in input order.
#[instrument(level = "info", skip_all, fields(count = urls.len()))]
pub async fn fetch_articles<E, P>(extractor: &E, urls: &[Option<&str>], progress: &P) -> Vec<Option<String>>
where
    E: ArticleExtractor,
    P: ProgressReporter,
{
    let total = urls.len();
    let texts: Vec<Option<String>> = stream::iter(urls.iter().enumerate())
        .then(|(i, url)| async move {
            let text = match url {
                None => {
                    warn!(index = i, "Row has no URL");
                    None
                }
                Some(url) => match extractor.extract(url).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!(index = i, %url, error = %e, "Article fetch failed");
                        None
                    }
                },
            };
            progress.report(Stage::Enrich, i + 1, total);
            text
        })
        .collect()
        .await;

    let found = texts.iter().filter(|t| t.is_some()).count();
    info!(total, found, missing = total - found, "Fetched article texts");
    texts
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned texts; any other URL fails.
    #[derive(Debug, Default)]
    pub struct Canned {
        pub texts: HashMap<String, String>,
    }

    impl Canned {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                texts: pairs
                    .iter()
                    .map(|(u, t)| (u.to_string(), t.to_string()))
                    .collect(),
            }
        }
    }

    impl ArticleExtractor for Canned {
        async fn extract(&self, url: &str) -> Result<String, ExtractError> {
            self.texts.get(url).cloned().ok_or(ExtractError::NoText)
        }
    }
}
