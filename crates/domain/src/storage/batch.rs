use std::{fmt, time::Duration};

use tracing::debug;

use super::traits::{Fields, RecordKey, RecordStore, StorageResult, StoreOp, WatchedKey};

/// Queue of store writes applied atomically on [`Batch::commit`].
///
/// Dropping a batch without committing discards every queued op. Keys passed
/// to [`Batch::watch`] make the commit fail with
/// [`StorageError::TransactionAborted`](super::StorageError::TransactionAborted)
/// if another writer touched them in the meantime.
pub struct Batch<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    ops: Vec<StoreOp>,
    watched: Vec<WatchedKey>,
}

impl<'s, S: RecordStore + ?Sized> Batch<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            ops: Vec::new(),
            watched: Vec::new(),
        }
    }

    pub async fn watch(&mut self, key: &RecordKey) -> StorageResult<()> {
        let version = self.store.version(key).await?;
        self.watched.push(WatchedKey {
            key: key.clone(),
            version,
        });
        Ok(())
    }

    pub fn add(&mut self, op: StoreOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn hset(&mut self, key: &RecordKey, fields: Fields) -> &mut Self {
        self.add(StoreOp::HashSet {
            key: key.clone(),
            fields,
        })
    }

    pub fn hdel(&mut self, key: &RecordKey, fields: Vec<String>) -> &mut Self {
        self.add(StoreOp::HashDelete {
            key: key.clone(),
            fields,
        })
    }

    pub fn expire(&mut self, key: &RecordKey, ttl: Duration) -> &mut Self {
        self.add(StoreOp::Expire {
            key: key.clone(),
            ttl,
        })
    }

    pub fn delete(&mut self, key: &RecordKey) -> &mut Self {
        self.add(StoreOp::Delete { key: key.clone() })
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub async fn commit(self) -> StorageResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        debug!(
            queued = self.ops.len(),
            watched = self.watched.len(),
            "committing batch"
        );
        self.store.execute(self.ops, self.watched).await
    }

    pub fn discard(self) {
        debug!(queued = self.ops.len(), "batch discarded");
    }
}

impl<S: RecordStore + ?Sized> fmt::Debug for Batch<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("ops", &self.ops)
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}
