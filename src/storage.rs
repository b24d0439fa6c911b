//! Durable checkpoints on disk.
//!
//! Every stage writes its result here so later stages can be re-run from a
//! fresh process without repeating the slow network work before them.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! └── worldnews/
//!     ├── worldnews.json            # raw records from the collector
//!     ├── worldnews.csv             # raw records as a table
//!     ├── worldnews_scope.csv       # subreddit, title, url
//!     ├── worldnews_full.csv        # scope + article_text
//!     └── worldnews_full_clean.csv  # output of the clean stage
//! ```

use crate::models::Record;
use crate::table::{Table, TableError};
use clap::ValueEnum;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("CSV error in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("malformed table in {}: {source}", path.display())]
    Table { path: PathBuf, source: TableError },
}

/// The three tabular checkpoints kept per subreddit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TableKind {
    /// Every raw record field.
    #[value(name = "unfiltered")]
    Raw,
    /// `subreddit`, `title` and `url` only.
    #[value(name = "filtered")]
    Scope,
    /// The scoped view plus `article_text`.
    #[value(name = "full")]
    Full,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [TableKind::Raw, TableKind::Scope, TableKind::Full];

    fn suffix(self) -> &'static str {
        match self {
            TableKind::Raw => "",
            TableKind::Scope => "_scope",
            TableKind::Full => "_full",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableKind::Raw => "unfiltered",
            TableKind::Scope => "filtered",
            TableKind::Full => "full",
        })
    }
}

/// Paths of every checkpoint belonging to one subreddit.
#[derive(Debug, Clone)]
pub struct SubredditStore {
    dir: PathBuf,
    name: String,
}

impl SubredditStore {
    pub fn new(data_dir: impl AsRef<Path>, subreddit: &str) -> Self {
        Self {
            dir: data_dir.as_ref().join(subreddit),
            name: subreddit.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    pub fn table_path(&self, kind: TableKind) -> PathBuf {
        self.dir.join(format!("{}{}.csv", self.name, kind.suffix()))
    }

    pub fn clean_table_path(&self, kind: TableKind) -> PathBuf {
        self.dir
            .join(format!("{}{}_clean.csv", self.name, kind.suffix()))
    }

    /// Write the raw record list, replacing any earlier checkpoint.
    #[instrument(level = "info", skip_all, fields(count = records.len()))]
    pub async fn save_records(&self, records: &[Record]) -> Result<PathBuf, StorageError> {
        let path = self.records_path();
        let json = serde_json::to_vec(records).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::Io {
                path: self.dir.clone(),
                source,
            })?;

        // write-then-rename so a crash mid-write keeps the previous checkpoint
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|source| StorageError::Io {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "Wrote raw records");
        Ok(path)
    }

    /// Read the raw record list back, or `None` when no checkpoint exists.
    #[instrument(level = "info", skip_all)]
    pub async fn load_records(&self) -> Result<Option<Vec<Record>>, StorageError> {
        let path = self.records_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        let records: Vec<Record> =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), count = records.len(), "Loaded raw records");
        Ok(Some(records))
    }

    /// Write the checkpoint CSV for `kind` and return its path.
    pub fn save_table(&self, kind: TableKind, table: &Table) -> Result<PathBuf, StorageError> {
        let path = self.table_path(kind);
        write_csv(&path, table)?;
        Ok(path)
    }

    /// Write the `_clean` copy for `kind`, leaving the checkpoint alone.
    pub fn save_clean_table(&self, kind: TableKind, table: &Table) -> Result<PathBuf, StorageError> {
        let path = self.clean_table_path(kind);
        write_csv(&path, table)?;
        Ok(path)
    }

    /// Read a table checkpoint, or `None` when it was never written.
    pub fn load_table(&self, kind: TableKind) -> Result<Option<Table>, StorageError> {
        let path = self.table_path(kind);
        if !path.exists() {
            debug!(path = %path.display(), "Table checkpoint not present");
            return Ok(None);
        }
        read_csv(&path).map(Some)
    }
}

/// Write a table as CSV with a header row. Absent cells become empty fields.
#[instrument(level = "info", skip_all, fields(path = %path.display(), rows = table.len()))]
pub fn write_csv(path: &Path, table: &Table) -> Result<(), StorageError> {
    let csv_err = |source: csv::Error| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(table.columns()).map_err(csv_err)?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote table");
    Ok(())
}

/// Read a CSV file written by [`write_csv`]. Empty fields become absent cells.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_csv(path: &Path) -> Result<Table, StorageError> {
    let csv_err = |source: csv::Error| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut table = Table::new(columns);
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let row = record
            .iter()
            .map(|field| (!field.is_empty()).then(|| field.to_string()))
            .collect();
        table.push_row(row).map_err(|source| StorageError::Table {
            path: path.to_path_buf(),
            source,
        })?;
    }
    info!(rows = table.len(), "Read table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_record;
    use serde_json::json;

    #[test]
    fn test_paths() {
        let store = SubredditStore::new("/data", "worldnews");
        assert_eq!(store.records_path(), PathBuf::from("/data/worldnews/worldnews.json"));
        assert_eq!(
            store.table_path(TableKind::Raw),
            PathBuf::from("/data/worldnews/worldnews.csv")
        );
        assert_eq!(
            store.table_path(TableKind::Scope),
            PathBuf::from("/data/worldnews/worldnews_scope.csv")
        );
        assert_eq!(
            store.clean_table_path(TableKind::Full),
            PathBuf::from("/data/worldnews/worldnews_full_clean.csv")
        );
    }

    #[tokio::test]
    async fn test_records_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubredditStore::new(dir.path(), "worldnews");
        assert!(store.load_records().await.unwrap().is_none());

        let mut record = sample_record("a", 100);
        record.extra.insert("score".to_string(), json!(12));
        store.save_records(&[record.clone()]).await.unwrap();

        let loaded = store.load_records().await.unwrap().unwrap();
        assert_eq!(loaded, vec![record]);
        assert!(!store.records_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_table_checkpoint_keeps_absent_and_multiline() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubredditStore::new(dir.path(), "news");
        assert!(store.load_table(TableKind::Full).unwrap().is_none());

        let table = Table::from_rows(
            ["title", "article_text"],
            vec![
                vec![Some("A, quoted \"title\"".to_string()), Some("line one\n\nline two".to_string())],
                vec![Some("B".to_string()), None],
            ],
        )
        .unwrap();
        store.save_table(TableKind::Full, &table).unwrap();

        let loaded = store.load_table(TableKind::Full).unwrap().unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        assert!(read_csv(&path).is_err());
    }
}
