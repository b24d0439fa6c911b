//! # Subreddit Harvest
//!
//! A batch collector that pulls subreddit submissions from the Pushshift
//! archive, fetches the news articles they link to, and cleans the
//! resulting tables for manual analysis.
//!
//! ## Usage
//!
//! ```sh
//! subreddit_harvest scrape worldnews --num 1000
//! subreddit_harvest enrich worldnews
//! subreddit_harvest clean worldnews
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture, one subcommand per stage:
//! 1. **Scrape**: Page backward through the archive until enough posts are held
//! 2. **Enrich**: Download each linked article and extract its text
//! 3. **Clean**: Drop duplicate rows and annotate text lengths
//!
//! Every stage writes a checkpoint under `<data_dir>/<subreddit>/`, so any
//! stage can be re-run on its own from a fresh process.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cleaning;
mod cli;
mod collector;
mod config;
mod models;
mod pipeline;
mod progress;
mod scrapers;
mod storage;
mod table;
mod utils;

use api::{PushshiftClient, RetryFetch};
use cleaning::TableOutcome;
use cli::{Cli, Command};
use config::Config;
use pipeline::{CleanOptions, PipelineError};
use progress::LogProgress;
use scrapers::article::HtmlArticleExtractor;
use storage::{SubredditStore, TableKind};
use utils::{DOGE, ensure_writable_dir};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    if args.command == Command::Doge {
        println!("{DOGE}");
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    if let Err(e) = ensure_writable_dir(&config.data_dir).await {
        error!(
            path = %config.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    match args.command {
        Command::Scrape { subreddit, num } => run_scrape(&config, &subreddit, num as usize).await?,
        Command::Enrich {
            subreddit,
            from_json,
        } => run_enrich(&config, &subreddit, from_json).await?,
        Command::Clean {
            subreddit,
            scope,
            dedup_column,
            length_column,
            no_dedup,
            no_lengths,
        } => {
            let options = CleanOptions {
                dedup_column: (!no_dedup).then_some(dedup_column),
                length_column: (!no_lengths).then_some(length_column),
            };
            run_clean(&config, &subreddit, &scope, &options).await?
        }
        Command::Doge => {}
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn run_scrape(config: &Config, subreddit: &str, num: usize) -> Result<(), Box<dyn Error>> {
    let store = SubredditStore::new(&config.data_dir, subreddit);
    let source = RetryFetch::from_config(PushshiftClient::new(&config.api_url), &config.collector);

    let output = pipeline::scrape(&source, &config.collector, &store, subreddit, num, &LogProgress).await?;
    info!(
        subreddit = %output.collection.subreddit,
        collected = output.collection.records.len(),
        target = output.collection.target,
        pages = output.collection.pages,
        removed = output.collection.removed,
        malformed = output.collection.malformed,
        cursor = ?output.collection.cursor,
        raw_columns = output.raw.columns().len(),
        scoped_rows = output.scope.len(),
        stop = %output.collection.stop,
        dir = %store.dir().display(),
        "Scrape complete"
    );
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn run_enrich(config: &Config, subreddit: &str, from_json: bool) -> Result<(), Box<dyn Error>> {
    let store = SubredditStore::new(&config.data_dir, subreddit);
    let scope = if from_json {
        pipeline::load_from_json(&store)
            .await?
            .scope
            .ok_or(PipelineError::MissingCheckpoint("scoped"))?
    } else {
        store
            .load_table(TableKind::Scope)?
            .ok_or(PipelineError::MissingCheckpoint("scoped CSV"))?
    };

    if scope.is_empty() {
        warn!("Scoped table has no rows; nothing to fetch");
    }

    let extractor = HtmlArticleExtractor::new(&config.articles)?;
    let full = pipeline::enrich(&scope, &extractor, &LogProgress).await?;
    let path = store.save_table(TableKind::Full, &full)?;
    info!(rows = full.len(), path = %path.display(), "Enrich complete");
    Ok(())
}

#[instrument(level = "info", skip(config, options))]
async fn run_clean(
    config: &Config,
    subreddit: &str,
    scope: &[TableKind],
    options: &CleanOptions,
) -> Result<(), Box<dyn Error>> {
    let store = SubredditStore::new(&config.data_dir, subreddit);
    let tables = pipeline::load_from_csv(&store, scope)?;
    let report = pipeline::clean(tables, options, &store)?;

    for (kind, outcome) in &report.dedup {
        match outcome {
            TableOutcome::Deduplicated { removed } => info!(table = %kind, removed, "Deduplicated"),
            TableOutcome::NotLoaded => debug!(table = %kind, "Not loaded; skipped"),
            TableOutcome::Absorbed(e) => warn!(table = %kind, error = %e, "Left as is"),
        }
    }
    if let Some(Err(e)) = &report.lengths {
        error!(error = %e, "Length annotation skipped");
    }
    info!(written = report.written.len(), "Clean complete");
    Ok(())
}
