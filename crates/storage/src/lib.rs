//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).
//!
//! Hash records live in two tables: `records` carries each key's expiry and
//! write counter, `record_fields` its field values. Lapsed keys stay on disk
//! until the sweeper purges them but are invisible to every read.

mod builder;
mod entity;
mod feedback_store;
mod migration;
mod record_store;

use std::sync::Arc;

pub use builder::StorageBuilder;
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};
use vanish_domain::storage::{StorageError, StorageResult};

/// Shared storage handle used by the HTTP API and sweeper services.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        prepare_connection(&db).await?;
        Ok(Self::from_connection(db))
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

pub(crate) async fn prepare_connection(db: &DatabaseConnection) -> StorageResult<()> {
    run_migrations(db).await
}
