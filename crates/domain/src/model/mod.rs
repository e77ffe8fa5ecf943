//! Data structures shared across the API, storage and sweeper crates.

mod brand;
mod caller;
mod domain;
mod logo;

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::storage::{Fields, StorageError, StorageResult};

pub use brand::*;
pub use caller::*;
pub use domain::*;
pub use logo::*;

/// One message accepted by the feedback sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub message: String,
    pub received_at: DateTime<Utc>,
}

/// Keeps the first `max` characters of `value`.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

pub(crate) fn required_field<'a>(fields: &'a Fields, name: &str) -> StorageResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StorageError::Database(format!("record field `{name}` missing")))
}

pub(crate) fn parse_field<T>(fields: &Fields, name: &str) -> StorageResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    required_field(fields, name)?
        .parse()
        .map_err(|err| StorageError::Database(format!("record field `{name}`: {err}")))
}

pub(crate) fn optional_field(fields: &Fields, name: &str) -> Option<String> {
    fields.get(name).filter(|value| !value.is_empty()).cloned()
}
