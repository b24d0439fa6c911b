//! The stage chain: scrape, enrich, clean.
//!
//! Every stage takes the previous stage's output value (or reloads it from
//! its checkpoint) and returns its own. Nothing is carried between stages in
//! shared state.
//!
//! ```text
//! scrape:  ArchiveSource ─► Collection ─► raw Table ─► scoped Table
//! enrich:  scoped Table ─► ArticleExtractor ─► full Table (+ article_text)
//! clean:   LoadedTables ─► dedup ─► length annotation
//! ```

use crate::api::ArchiveSource;
use crate::cleaning::{self, CleaningError, LengthStats, LoadedTables, TableOutcome};
use crate::collector::{CollectError, Collection, Collector};
use crate::config::CollectorConfig;
use crate::progress::ProgressReporter;
use crate::scrapers::article::{ArticleExtractor, fetch_articles};
use crate::storage::{StorageError, SubredditStore, TableKind};
use crate::table::{Table, TableError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Columns kept in the scoped view.
pub const SCOPE_COLUMNS: [&str; 3] = ["subreddit", "title", "url"];

/// Column the enrich stage adds.
pub const ARTICLE_TEXT_COLUMN: &str = "article_text";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("no {0} checkpoint for this subreddit; run the previous stage first")]
    MissingCheckpoint(&'static str),
}

/// Everything the scrape stage produced.
#[derive(Debug)]
pub struct ScrapeOutput {
    pub collection: Collection,
    pub raw: Table,
    pub scope: Table,
}

/// Project a raw table to the columns enrichment needs.
pub fn scoped_view(raw: &Table) -> Result<Table, TableError> {
    raw.project(&SCOPE_COLUMNS)
}

/// Collect records and write the raw JSON, raw CSV and scoped CSV checkpoints.
///
/// A collection that stops early is still saved; the stop reason is logged
/// and returned in the output.
///
/// # Arguments
///
/// * `source` - Archive to page through, usually a [`crate::api::RetryFetch`]
/// * `config` - Page size, pacing, stall tolerance and checkpoint interval
/// * `store` - Checkpoint location for `subreddit`
/// * `target` - Minimum number of non-removed records wanted
/// * `progress` - Receives `(collected, target)` after every page
///
/// # Returns
///
/// The collection with the raw and scoped tables built from it, or an error
/// if the input is invalid or a checkpoint cannot be written.
#[instrument(level = "info", skip(source, config, store, progress))]
pub async fn scrape<S, P>(
    source: &S,
    config: &CollectorConfig,
    store: &SubredditStore,
    subreddit: &str,
    target: usize,
    progress: &P,
) -> Result<ScrapeOutput, PipelineError>
where
    S: ArchiveSource,
    P: ProgressReporter,
{
    let collection = Collector::new(source, config, progress)
        .with_checkpoints(store)
        .collect(subreddit, target)
        .await?;
    if !collection.stop.is_complete() {
        warn!(
            collected = collection.records.len(),
            target,
            stop = %collection.stop,
            "Collection ended early; saving partial result"
        );
    }

    store.save_records(&collection.records).await?;
    let raw = Table::from_records(&collection.records);
    store.save_table(TableKind::Raw, &raw)?;
    let scope = scoped_view(&raw)?;
    store.save_table(TableKind::Scope, &scope)?;

    Ok(ScrapeOutput {
        collection,
        raw,
        scope,
    })
}

/// Attach article text to every row of a scoped table.
///
/// The result keeps the input's rows and order; rows whose article could
/// not be fetched get an absent `article_text`.
///
/// # Arguments
///
/// * `scope` - Table with a `url` column
/// * `extractor` - Fetches and extracts one article at a time
/// * `progress` - Receives `(done, rows)` after every URL
///
/// # Returns
///
/// The full table, or [`TableError::MissingColumn`] when `scope` has no `url`.
#[instrument(level = "info", skip_all, fields(rows = scope.len()))]
pub async fn enrich<E, P>(scope: &Table, extractor: &E, progress: &P) -> Result<Table, TableError>
where
    E: ArticleExtractor,
    P: ProgressReporter,
{
    let urls = scope.column("url")?;
    let texts = fetch_articles(extractor, &urls, progress).await;
    let mut full = scope.clone();
    full.set_column(ARTICLE_TEXT_COLUMN, texts)?;
    Ok(full)
}

/// Rebuild the raw and scoped tables from the JSON checkpoint.
pub async fn load_from_json(store: &SubredditStore) -> Result<LoadedTables, PipelineError> {
    let records = store
        .load_records()
        .await?
        .ok_or(PipelineError::MissingCheckpoint("raw JSON"))?;
    let raw = Table::from_records(&records);
    let scope = scoped_view(&raw)?;
    Ok(LoadedTables {
        raw: Some(raw),
        scope: Some(scope),
        full: None,
    })
}

/// Read the requested table checkpoints. Missing files stay unloaded.
pub fn load_from_csv(store: &SubredditStore, kinds: &[TableKind]) -> Result<LoadedTables, StorageError> {
    let mut tables = LoadedTables::default();
    for &kind in kinds {
        match store.load_table(kind)? {
            Some(table) => tables.set(kind, table),
            None => info!(table = %kind, "Table not available; leaving unloaded"),
        }
    }
    Ok(tables)
}

/// Which cleaning steps to run and on which columns.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub dedup_column: Option<String>,
    pub length_column: Option<String>,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            dedup_column: Some(cleaning::DEFAULT_DEDUP_COLUMN.to_string()),
            length_column: Some(cleaning::DEFAULT_LENGTH_COLUMN.to_string()),
        }
    }
}

/// What the clean stage did.
#[derive(Debug)]
pub struct CleanReport {
    pub dedup: Vec<(TableKind, TableOutcome)>,
    pub lengths: Option<Result<LengthStats, CleaningError>>,
    pub written: Vec<PathBuf>,
}

/// Deduplicate and annotate the loaded tables, then write `*_clean.csv` copies.
///
/// Per-table cleaning failures are reported in the [`CleanReport`], not
/// returned as errors.
///
/// # Arguments
///
/// * `tables` - Whatever [`load_from_csv`] or [`load_from_json`] produced
/// * `options` - Columns to deduplicate and measure; `None` skips the step
/// * `store` - Where the cleaned copies go
///
/// # Returns
///
/// The report, or an error if a cleaned table cannot be written.
#[instrument(level = "info", skip_all)]
pub fn clean(
    mut tables: LoadedTables,
    options: &CleanOptions,
    store: &SubredditStore,
) -> Result<CleanReport, StorageError> {
    let dedup = match &options.dedup_column {
        Some(column) => cleaning::remove_duplicates(&mut tables, column),
        None => Vec::new(),
    };
    let lengths = options
        .length_column
        .as_deref()
        .map(|column| cleaning::sort_length(&mut tables, column));

    let written = tables
        .iter()
        .map(|(kind, table)| store.save_clean_table(kind, table))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CleanReport {
        dedup,
        lengths,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchError, PageQuery};
    use crate::config::DelayRange;
    use crate::models::{Page, sample_record};
    use crate::progress::LogProgress;
    use crate::scrapers::article::testing::Canned;
    use crate::table::titles;
    use std::cell::Cell;

    /// Serves two pages, the second repeating a title from the first, then nothing.
    struct TwoPages {
        calls: Cell<usize>,
    }

    impl ArchiveSource for TwoPages {
        async fn fetch_page(&self, _query: &PageQuery) -> Result<Page, FetchError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            Ok(match call {
                0 => Page::from_records(vec![sample_record("Alpha", 300), sample_record("Beta", 200)]),
                1 => Page::from_records(vec![sample_record("Alpha", 100)]),
                _ => Page::default(),
            })
        }
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            page_delay: DelayRange::none(),
            retry_delay: DelayRange::none(),
            ..CollectorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stage_chain_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubredditStore::new(dir.path(), "worldnews");
        let source = TwoPages { calls: Cell::new(0) };

        // scrape: exhausts after two pages, short of the target
        let output = scrape(&source, &fast_config(), &store, "worldnews", 10, &LogProgress)
            .await
            .unwrap();
        assert_eq!(output.collection.records.len(), 3);
        assert_eq!(output.scope.columns(), &SCOPE_COLUMNS);
        assert!(store.records_path().exists());
        assert!(store.table_path(TableKind::Raw).exists());

        // enrich from the scoped checkpoint
        let scope = store.load_table(TableKind::Scope).unwrap().unwrap();
        assert_eq!(scope, output.scope);
        let extractor = Canned::with(&[("https://example.com/300", "alpha body text")]);
        let full = enrich(&scope, &extractor, &LogProgress).await.unwrap();
        assert_eq!(
            full.column(ARTICLE_TEXT_COLUMN).unwrap(),
            vec![Some("alpha body text"), None, None]
        );
        store.save_table(TableKind::Full, &full).unwrap();

        // clean everything that is on disk
        let tables = load_from_csv(&store, &TableKind::ALL).unwrap();
        let report = clean(tables, &CleanOptions::default(), &store).unwrap();

        assert!(report.dedup.iter().all(|(_, outcome)| *outcome
            == TableOutcome::Deduplicated { removed: 1 }));
        assert!(matches!(report.lengths, Some(Ok(LengthStats { rows: 2, absent: 1, .. }))));
        assert_eq!(report.written.len(), 3);

        let cleaned = crate::storage::read_csv(&store.clean_table_path(TableKind::Full)).unwrap();
        assert_eq!(titles(&cleaned), vec!["Alpha", "Beta"]);
        assert_eq!(cleaned.get(0, "article_text_num_words"), Some("3"));
    }

    #[tokio::test]
    async fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubredditStore::new(dir.path(), "news");
        assert!(matches!(
            load_from_json(&store).await,
            Err(PipelineError::MissingCheckpoint(_))
        ));

        store
            .save_records(&[sample_record("a", 2), sample_record("b", 1)])
            .await
            .unwrap();
        let tables = load_from_json(&store).await.unwrap();
        assert_eq!(tables.raw.as_ref().unwrap().len(), 2);
        assert_eq!(tables.scope.as_ref().unwrap().columns(), &SCOPE_COLUMNS);
        assert!(tables.full.is_none());
    }

    #[test]
    fn test_clean_with_only_scope_reports_missing_full() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubredditStore::new(dir.path(), "news");
        let scope = scoped_view(&Table::from_records(&[
            sample_record("a", 2),
            sample_record("a", 1),
        ]))
        .unwrap();
        store.save_table(TableKind::Scope, &scope).unwrap();

        let tables = load_from_csv(&store, &TableKind::ALL).unwrap();
        assert!(tables.raw.is_none());
        let report = clean(tables, &CleanOptions::default(), &store).unwrap();

        assert!(matches!(
            report.lengths,
            Some(Err(CleaningError::NotLoaded(TableKind::Full)))
        ));
        assert_eq!(report.written, vec![store.clean_table_path(TableKind::Scope)]);
    }

    #[tokio::test]
    async fn test_enrich_requires_url_column() {
        let table = Table::new(["title"]);
        let err = enrich(&table, &Canned::default(), &LogProgress).await.unwrap_err();
        assert_eq!(err, TableError::MissingColumn("url".to_string()));
    }
}
