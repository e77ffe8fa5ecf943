use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::FeedbackEntry;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("transaction aborted: watched key `{0}` changed")]
    TransactionAborted(RecordKey),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Field map of a hash record, ordered so encodings are deterministic.
pub type Fields = BTreeMap<String, String>;

/// Store key of one logical record, e.g. `custom_domain:3f2a...:object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Joins the parts with `:`.
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|part| part.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(":");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(remaining) => Some(*remaining),
            KeyTtl::Missing | KeyTtl::Persistent => None,
        }
    }
}

/// A single write understood by every record store. Batches are ordered
/// lists of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Upserts fields. A lapsed key is replaced, not merged. An empty field
    /// map is a no-op.
    HashSet { key: RecordKey, fields: Fields },
    /// Removes fields; the key disappears with its last field.
    HashDelete { key: RecordKey, fields: Vec<String> },
    /// Sets the remaining lifetime. Zero makes the key persistent. Missing
    /// keys are left alone.
    Expire { key: RecordKey, ttl: Duration },
    Delete { key: RecordKey },
}

impl StoreOp {
    pub fn key(&self) -> &RecordKey {
        match self {
            StoreOp::HashSet { key, .. }
            | StoreOp::HashDelete { key, .. }
            | StoreOp::Expire { key, .. }
            | StoreOp::Delete { key } => key,
        }
    }
}

/// Version of a key observed when it was watched; `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedKey {
    pub key: RecordKey,
    pub version: Option<u64>,
}

/// Redis-like hash store with per-key expiry.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns all fields of a live key, `None` when absent or lapsed.
    async fn hgetall(&self, key: &RecordKey) -> StorageResult<Option<Fields>>;
    async fn hget(&self, key: &RecordKey, field: &str) -> StorageResult<Option<String>>;
    async fn ttl(&self, key: &RecordKey) -> StorageResult<KeyTtl>;
    /// Write counter of a live key, used by optimistic watches.
    async fn version(&self, key: &RecordKey) -> StorageResult<Option<u64>>;
    /// Applies `ops` atomically. Fails with
    /// [`StorageError::TransactionAborted`] and applies nothing when any
    /// watched key no longer has the recorded version.
    async fn execute(&self, ops: Vec<StoreOp>, watched: Vec<WatchedKey>) -> StorageResult<()>;
    /// Physically removes lapsed keys, returning how many were dropped.
    async fn purge_expired(&self) -> StorageResult<u64>;

    async fn exists(&self, key: &RecordKey) -> StorageResult<bool> {
        Ok(!matches!(self.ttl(key).await?, KeyTtl::Missing))
    }

    async fn hset(&self, key: &RecordKey, fields: Fields) -> StorageResult<()> {
        let op = StoreOp::HashSet {
            key: key.clone(),
            fields,
        };
        self.execute(vec![op], Vec::new()).await
    }

    async fn hdel(&self, key: &RecordKey, fields: Vec<String>) -> StorageResult<()> {
        let op = StoreOp::HashDelete {
            key: key.clone(),
            fields,
        };
        self.execute(vec![op], Vec::new()).await
    }

    async fn expire(&self, key: &RecordKey, ttl: Duration) -> StorageResult<()> {
        let op = StoreOp::Expire {
            key: key.clone(),
            ttl,
        };
        self.execute(vec![op], Vec::new()).await
    }

    async fn delete(&self, key: &RecordKey) -> StorageResult<()> {
        let op = StoreOp::Delete { key: key.clone() };
        self.execute(vec![op], Vec::new()).await
    }
}

/// Append-only sink for visitor feedback.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn add_feedback(&self, message: String, received_at: DateTime<Utc>)
        -> StorageResult<()>;
    async fn recent_feedback(&self, limit: u64) -> StorageResult<Vec<FeedbackEntry>>;
}
