//! In-memory tables with named columns.
//!
//! A [`Table`] is the tabular value every stage after collection passes on:
//! the full raw table, the scoped view, and the enriched table are all
//! tables that differ only in their columns. A row's index is its position,
//! so removing rows always leaves a contiguous index starting at zero.
//!
//! Cells are `Option<String>`; `None` is the absent marker (an empty CSV
//! cell on disk).

use crate::models::Record;
use itertools::Itertools;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

pub type Cell = Option<String>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TableError {
    #[error("column `{0}` not found")]
    MissingColumn(String),
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column has {found} values, table has {expected} rows")]
    LengthMismatch { expected: usize, found: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// An empty table with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table, checking every row has one cell per column.
    #[cfg(test)]
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Flatten raw records into a table.
    ///
    /// Columns are the union of all record fields in first-seen order.
    /// Records lacking a field get an absent cell. Nested values are kept as
    /// their JSON text.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = vec![
            "subreddit".to_string(),
            "title".to_string(),
            "url".to_string(),
            "created_utc".to_string(),
        ];
        for record in records {
            for key in record.extra.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match column.as_str() {
                        "subreddit" => Some(record.subreddit.clone()),
                        "title" => Some(record.title.clone()),
                        "url" => Some(record.url.clone()),
                        "created_utc" => Some(record.created_utc.to_string()),
                        other => record.extra.get(other).and_then(value_to_cell),
                    })
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// The values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<Option<&str>>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// A single cell, or `None` when it is absent or out of range.
    #[cfg(test)]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column).ok()?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Append a row; it must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::Ragged {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Set a column's values, replacing it if it exists and appending it otherwise.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_index(name) {
            Ok(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            Err(_) => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// A new table holding only `columns`, in the given order.
    pub fn project(&self, columns: &[&str]) -> Result<Table, TableError> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Keep the first row for each distinct value of `column`, dropping later ones.
    ///
    /// Absent cells compare equal to each other. Returns the number of rows removed.
    pub fn drop_duplicates(&mut self, column: &str) -> Result<usize, TableError> {
        let idx = self.column_index(column)?;
        let before = self.rows.len();
        self.rows = std::mem::take(&mut self.rows)
            .into_iter()
            .unique_by(|row| row[idx].clone())
            .collect();
        Ok(before - self.rows.len())
    }

    /// Stable ascending sort by a numeric column; absent or non-numeric cells go last.
    pub fn sort_by_numeric(&mut self, column: &str) -> Result<(), TableError> {
        let idx = self.column_index(column)?;
        let key = |row: &Vec<Cell>| row[idx].as_deref().and_then(|s| s.parse::<f64>().ok());
        self.rows.sort_by(|a, b| match (key(a), key(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(())
    }
}

fn value_to_cell(value: &Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) fn titles(table: &Table) -> Vec<&str> {
    table
        .column("title")
        .unwrap()
        .into_iter()
        .map(|t| t.unwrap_or(""))
        .collect()
}
