//! Scrapers for the pages submissions link to.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Any news article | [`article`] | HTML scraping | `<article>`, then `<main>`, then all `<p>` |
//!
//! Each scraper exposes an extractor type implementing
//! [`article::ArticleExtractor`], and failures are logged and turned into
//! absent values instead of failing the run.

pub mod article;
