//! Deduplication and length diagnostics over the loaded tables.
//!
//! Cleaning operates on whichever of the three checkpoint tables are in
//! memory. Tables that were never loaded are skipped, and per-table
//! problems during deduplication are absorbed and reported per table
//! rather than failing the whole pass.

use crate::storage::TableKind;
use crate::table::{Cell, Table, TableError};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_DEDUP_COLUMN: &str = "title";
pub const DEFAULT_LENGTH_COLUMN: &str = "article_text";

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("static regex"));

#[derive(Debug, Error, PartialEq)]
pub enum CleaningError {
    #[error("{0} table is not loaded")]
    NotLoaded(TableKind),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// The checkpoint tables currently held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTables {
    pub raw: Option<Table>,
    pub scope: Option<Table>,
    pub full: Option<Table>,
}

impl LoadedTables {
    pub fn get(&self, kind: TableKind) -> Option<&Table> {
        match kind {
            TableKind::Raw => self.raw.as_ref(),
            TableKind::Scope => self.scope.as_ref(),
            TableKind::Full => self.full.as_ref(),
        }
    }

    pub fn get_mut(&mut self, kind: TableKind) -> Option<&mut Table> {
        match kind {
            TableKind::Raw => self.raw.as_mut(),
            TableKind::Scope => self.scope.as_mut(),
            TableKind::Full => self.full.as_mut(),
        }
    }

    pub fn set(&mut self, kind: TableKind, table: Table) {
        match kind {
            TableKind::Raw => self.raw = Some(table),
            TableKind::Scope => self.scope = Some(table),
            TableKind::Full => self.full = Some(table),
        }
    }

    /// Loaded tables in checkpoint order.
    pub fn iter(&self) -> impl Iterator<Item = (TableKind, &Table)> {
        TableKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|t| (kind, t)))
    }
}

/// What deduplication did to one table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Deduplicated { removed: usize },
    NotLoaded,
    /// The table could not be deduplicated; it was left untouched.
    Absorbed(TableError),
}

/// Drop later duplicates of `column` from every loaded table.
///
/// Each table is handled independently. Running this twice gives the same
/// tables as running it once.
#[instrument(level = "info", skip(tables))]
pub fn remove_duplicates(tables: &mut LoadedTables, column: &str) -> Vec<(TableKind, TableOutcome)> {
    TableKind::ALL
        .into_iter()
        .map(|kind| {
            let outcome = match tables.get_mut(kind) {
                None => TableOutcome::NotLoaded,
                Some(table) => match table.drop_duplicates(column) {
                    Ok(removed) => {
                        info!(table = %kind, removed, remaining = table.len(), "Removed duplicates");
                        TableOutcome::Deduplicated { removed }
                    }
                    Err(e) => {
                        warn!(table = %kind, error = %e, "Skipping deduplication");
                        TableOutcome::Absorbed(e)
                    }
                },
            };
            (kind, outcome)
        })
        .collect()
}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Length in characters, not bytes.
pub fn char_length(text: &str) -> usize {
    text.chars().count()
}

/// Summary of a length annotation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthStats {
    pub rows: usize,
    /// Rows whose text was absent.
    pub absent: usize,
    pub shortest: Option<usize>,
    pub longest: Option<usize>,
}

/// Append `<column>_num_words` and `<column>_length`, then sort ascending by length.
///
/// Absent text yields absent counts, and those rows sort last. Running it
/// again replaces the earlier annotation columns.
pub fn annotate_lengths(table: &mut Table, column: &str) -> Result<LengthStats, TableError> {
    let values = table.column(column)?;
    let lengths: Vec<Option<usize>> = values.iter().map(|v| v.map(char_length)).collect();
    let words: Vec<Cell> = values
        .iter()
        .map(|v| v.map(|t| word_count(t).to_string()))
        .collect();

    let stats = LengthStats {
        rows: lengths.len(),
        absent: lengths.iter().filter(|l| l.is_none()).count(),
        shortest: lengths.iter().flatten().min().copied(),
        longest: lengths.iter().flatten().max().copied(),
    };

    let length_column = format!("{column}_length");
    table.set_column(&format!("{column}_num_words"), words)?;
    table.set_column(
        &length_column,
        lengths.into_iter().map(|l| l.map(|n| n.to_string())).collect(),
    )?;
    table.sort_by_numeric(&length_column)?;
    Ok(stats)
}

/// Annotate the full (enriched) table with length and word-count columns.
///
/// Reports [`CleaningError::NotLoaded`] and changes nothing when the full
/// table is not in memory.
#[instrument(level = "info", skip(tables))]
pub fn sort_length(tables: &mut LoadedTables, column: &str) -> Result<LengthStats, CleaningError> {
    let Some(full) = tables.get_mut(TableKind::Full) else {
        error!("Error: full table not loaded");
        return Err(CleaningError::NotLoaded(TableKind::Full));
    };
    let stats = annotate_lengths(full, column)?;
    info!(
        rows = stats.rows,
        absent = stats.absent,
        shortest = ?stats.shortest,
        longest = ?stats.longest,
        "Annotated text lengths"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::titles;

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    fn title_table(titles: &[&str]) -> Table {
        Table::from_rows(["title"], titles.iter().map(|t| vec![cell(t)]).collect()).unwrap()
    }

    #[test]
    fn test_word_count_and_length() {
        assert_eq!(word_count("abc def"), 2);
        assert_eq!(char_length("abc def"), 7);
        assert_eq!(word_count("  spaced\tout\n\nwords  "), 3);
        assert_eq!(word_count(""), 0);
        assert_eq!(char_length("café"), 4);
    }

    #[test]
    fn test_dedup_scenario() {
        let mut tables = LoadedTables {
            full: Some(title_table(&["A", "A", "B"])),
            ..LoadedTables::default()
        };

        let outcomes = remove_duplicates(&mut tables, "title");

        let full = tables.full.as_ref().unwrap();
        assert_eq!(titles(full), vec!["A", "B"]);
        assert_eq!(full.len(), 2);
        assert_eq!(
            outcomes,
            vec![
                (TableKind::Raw, TableOutcome::NotLoaded),
                (TableKind::Scope, TableOutcome::NotLoaded),
                (TableKind::Full, TableOutcome::Deduplicated { removed: 1 }),
            ]
        );
    }

    #[test]
    fn test_dedup_is_idempotent_per_table() {
        let mut tables = LoadedTables {
            raw: Some(title_table(&["x", "y", "x", "z", "y"])),
            scope: Some(title_table(&["q", "q"])),
            full: None,
        };

        remove_duplicates(&mut tables, "title");
        let once = tables.clone();
        remove_duplicates(&mut tables, "title");

        assert_eq!(tables, once);
        assert_eq!(titles(tables.raw.as_ref().unwrap()), vec!["x", "y", "z"]);
        assert_eq!(titles(tables.scope.as_ref().unwrap()), vec!["q"]);
    }

    #[test]
    fn test_dedup_missing_column_is_absorbed() {
        let mut tables = LoadedTables {
            raw: Some(Table::from_rows(["url"], vec![vec![cell("u")], vec![cell("u")]]).unwrap()),
            scope: Some(title_table(&["a", "a"])),
            full: None,
        };

        let outcomes = remove_duplicates(&mut tables, "title");

        assert_eq!(
            outcomes[0],
            (
                TableKind::Raw,
                TableOutcome::Absorbed(TableError::MissingColumn("title".to_string()))
            )
        );
        assert_eq!(tables.raw.as_ref().unwrap().len(), 2);
        assert_eq!(tables.scope.as_ref().unwrap().len(), 1);

        let report = outcomes.clone();
        assert_eq!(report, outcomes);
    }

    #[test]
    fn test_sort_length_annotates_and_sorts() {
        let mut tables = LoadedTables {
            full: Some(
                Table::from_rows(
                    ["title", "article_text"],
                    vec![
                        vec![cell("long"), cell("one two three four")],
                        vec![cell("missing"), None],
                        vec![cell("short"), cell("abc def")],
                    ],
                )
                .unwrap(),
            ),
            ..LoadedTables::default()
        };

        let stats = sort_length(&mut tables, DEFAULT_LENGTH_COLUMN).unwrap();
        let full = tables.full.as_ref().unwrap();

        assert_eq!(
            full.columns(),
            &["title", "article_text", "article_text_num_words", "article_text_length"]
        );
        assert_eq!(titles(full), vec!["short", "long", "missing"]);
        assert_eq!(full.get(0, "article_text_num_words"), Some("2"));
        assert_eq!(full.get(0, "article_text_length"), Some("7"));
        assert_eq!(full.get(2, "article_text_length"), None);
        assert_eq!(
            stats,
            LengthStats {
                rows: 3,
                absent: 1,
                shortest: Some(7),
                longest: Some(18)
            }
        );

        let lengths: Vec<usize> = full
            .column("article_text_length")
            .unwrap()
            .into_iter()
            .flatten()
            .map(|l| l.parse().unwrap())
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_sort_length_twice_replaces_columns() {
        let mut table = Table::from_rows(["title"], vec![vec![cell("b c")], vec![cell("a")]]).unwrap();
        annotate_lengths(&mut table, "title").unwrap();
        let once = table.clone();
        annotate_lengths(&mut table, "title").unwrap();
        assert_eq!(table, once);
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn test_sort_length_without_full_table() {
        let mut tables = LoadedTables {
            scope: Some(title_table(&["a"])),
            ..LoadedTables::default()
        };
        let before = tables.clone();
        assert_eq!(
            sort_length(&mut tables, DEFAULT_LENGTH_COLUMN),
            Err(CleaningError::NotLoaded(TableKind::Full))
        );
        assert_eq!(tables, before);
    }

    #[test]
    fn test_sort_length_missing_column() {
        let mut tables = LoadedTables {
            full: Some(title_table(&["a"])),
            ..LoadedTables::default()
        };
        assert_eq!(
            sort_length(&mut tables, "article_text"),
            Err(CleaningError::Table(TableError::MissingColumn(
                "article_text".to_string()
            )))
        );
    }
}
