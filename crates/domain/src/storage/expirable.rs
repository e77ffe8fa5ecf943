//! Records whose persistence is time-bounded and refreshed on every save.

use std::time::Duration;

use tracing::debug;

use super::batch::Batch;
use super::traits::{Fields, KeyTtl, RecordKey, RecordStore, StorageResult};

/// Options for [`ExpirableRecord::update_expiration`]. A missing `ttl` falls
/// back to the record's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationOptions {
    pub ttl: Option<Duration>,
}

impl ExpirationOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Options for [`ExpirableRecord::save`]. `ttl` overrides the record's
/// default when the expiry is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub update_expiration: bool,
    pub ttl: Option<Duration>,
}

impl SaveOptions {
    /// Writes the fields and leaves the current TTL untouched.
    pub fn keep_expiration() -> Self {
        Self {
            update_expiration: false,
            ttl: None,
        }
    }

    /// Writes the fields and refreshes the expiry to `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            update_expiration: true,
            ttl: Some(ttl),
        }
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            update_expiration: true,
            ttl: None,
        }
    }
}

/// Binds a record key to the store that holds it and to the TTL that every
/// save re-applies.
pub struct ExpirableRecord<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    key: RecordKey,
    default_ttl: Duration,
}

impl<'s, S: RecordStore + ?Sized> ExpirableRecord<'s, S> {
    pub fn new(store: &'s S, key: RecordKey, default_ttl: Duration) -> Self {
        Self {
            store,
            key,
            default_ttl,
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn resolve_ttl(&self, options: ExpirationOptions) -> Duration {
        options.ttl.unwrap_or(self.default_ttl)
    }

    /// Refreshes the key's expiry right away.
    pub async fn update_expiration(&self, options: ExpirationOptions) -> StorageResult<()> {
        let ttl = self.resolve_ttl(options);
        debug!(key = %self.key, ttl_secs = ttl.as_secs(), "updating expiration");
        self.store.expire(&self.key, ttl).await
    }

    /// Queues the expiry refresh so it commits together with `batch`.
    pub fn queue_expiration(&self, batch: &mut Batch<'_, S>, options: ExpirationOptions) {
        let ttl = self.resolve_ttl(options);
        debug!(key = %self.key, ttl_secs = ttl.as_secs(), "queueing expiration");
        batch.expire(&self.key, ttl);
    }

    /// Opens a batch against the record's store.
    pub fn transaction(&self) -> Batch<'s, S> {
        Batch::new(self.store)
    }

    /// Writes `fields` and, unless disabled, refreshes the TTL in the same
    /// atomic batch.
    pub async fn save(&self, fields: Fields, options: SaveOptions) -> StorageResult<()> {
        let mut batch = self.transaction();
        self.queue_save(&mut batch, fields, options);
        batch.commit().await
    }

    /// Queues the writes of [`save`](Self::save) into a caller-owned batch.
    pub fn queue_save(&self, batch: &mut Batch<'_, S>, fields: Fields, options: SaveOptions) {
        batch.hset(&self.key, fields);
        if options.update_expiration {
            self.queue_expiration(batch, ExpirationOptions { ttl: options.ttl });
        }
    }

    pub async fn load(&self) -> StorageResult<Option<Fields>> {
        self.store.hgetall(&self.key).await
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        self.store.exists(&self.key).await
    }

    pub async fn ttl(&self) -> StorageResult<KeyTtl> {
        self.store.ttl(&self.key).await
    }

    pub async fn destroy(&self) -> StorageResult<()> {
        self.store.delete(&self.key).await
    }
}
