//! Data models for archived submissions and the pages they arrive in.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Record`]: One archived subreddit submission with its provider fields
//! - [`Page`]: One decoded response page from the archival search API
//! - [`Cursor`]: The exclusive upper time bound for the next page request
//!
//! Records keep every field the provider sent. Only the four fields the
//! pipeline depends on are typed; everything else rides along in
//! [`Record::extra`] so the raw checkpoint is lossless.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Provider field set on submissions that moderators or admins removed.
pub const REMOVED_FIELD: &str = "removed_by_category";

/// A single archived subreddit submission.
///
/// The typed fields are required; any record missing one of them is
/// rejected by [`Record::from_value`]. All other provider fields are kept
/// verbatim in `extra` and are flattened back into the JSON object on
/// serialization.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Record {
    /// The subreddit the submission was posted to.
    pub subreddit: String,
    /// The submission title. Used as the practical dedup key.
    pub title: String,
    /// The linked URL, either external or a self-post permalink.
    pub url: String,
    /// Creation time in seconds since the Unix epoch.
    pub created_utc: i64,
    /// Every other field the provider returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a raw JSON object could not become a [`Record`].
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record is missing field `{0}`")]
    MissingField(&'static str),
    #[error("record field `{0}` has the wrong type")]
    WrongType(&'static str),
}

impl Record {
    /// Build a record from one element of the API's `data` array.
    ///
    /// `created_utc` is accepted as an integer or a float (the archive has
    /// served both); floats are truncated toward zero.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut map) = value else {
            return Err(RecordError::NotAnObject);
        };

        let created_utc = timestamp_of(&map)?;
        let subreddit = take_string(&mut map, "subreddit")?;
        let title = take_string(&mut map, "title")?;
        let url = take_string(&mut map, "url")?;
        map.remove("created_utc");

        Ok(Record {
            subreddit,
            title,
            url,
            created_utc,
            extra: map,
        })
    }

    /// Whether the provider flagged this submission as removed.
    pub fn is_removed(&self) -> bool {
        self.extra
            .get(REMOVED_FIELD)
            .is_some_and(|v| !v.is_null())
    }
}

fn timestamp_of(map: &Map<String, Value>) -> Result<i64, RecordError> {
    match map.get("created_utc") {
        None | Some(Value::Null) => Err(RecordError::MissingField("created_utc")),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .ok_or(RecordError::WrongType("created_utc")),
    }
}

fn take_string(map: &mut Map<String, Value>, field: &'static str) -> Result<String, RecordError> {
    match map.remove(field) {
        None | Some(Value::Null) => Err(RecordError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(RecordError::WrongType(field)),
    }
}

/// The raw response envelope of the archival search API.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub data: Vec<Value>,
}

/// One decoded page of results.
///
/// `records` holds every well-formed record, removed ones included; the
/// collector does the filtering. `oldest_created_utc` covers malformed
/// entries too, as long as they carried a timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    pub malformed: usize,
    pub oldest_created_utc: Option<i64>,
}

impl Page {
    /// Decode an API response, keeping bad entries out of `records`.
    pub fn from_response(response: ApiResponse) -> Self {
        let mut page = Page::default();
        for value in response.data {
            if let Some(ts) = value.as_object().and_then(|m| timestamp_of(m).ok()) {
                page.oldest_created_utc = Some(page.oldest_created_utc.map_or(ts, |o| o.min(ts)));
            }
            match Record::from_value(value) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed record");
                    page.malformed += 1;
                }
            }
        }
        page
    }

    #[cfg(test)]
    pub fn from_records(records: Vec<Record>) -> Self {
        let oldest_created_utc = records.iter().map(|r| r.created_utc).min();
        Page {
            records,
            malformed: 0,
            oldest_created_utc,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.malformed == 0
    }
}

/// Exclusive upper bound (`before`) for the next page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(pub i64);

impl Cursor {
    /// The cursor that follows a page: its oldest timestamp minus one.
    ///
    /// Returns `None` when the page carried no timestamps at all.
    pub fn after(page: &Page) -> Option<Cursor> {
        page.oldest_created_utc.map(|ts| Cursor(ts - 1))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp(self.0, 0) {
            Some(dt) => write!(f, "{} ({})", self.0, dt.to_rfc3339()),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(title: &str, created_utc: i64) -> Record {
    Record {
        subreddit: "worldnews".to_string(),
        title: title.to_string(),
        url: format!("https://example.com/{created_utc}"),
        created_utc,
        extra: Map::new(),
    }
}
