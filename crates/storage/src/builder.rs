use sea_orm::{ConnectOptions, Database};
use vanish_domain::storage::{StorageError, StorageResult};

use crate::{prepare_connection, SeaOrmStorage};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Caps the pool size. In-memory SQLite needs `1` so every query sees
    /// the same database.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let mut options = ConnectOptions::new(url);
        if let Some(max) = self.max_connections {
            options.max_connections(max);
        }
        options.sqlx_logging(false);
        let db = Database::connect(options)
            .await
            .map_err(StorageError::from_source)?;
        prepare_connection(&db).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}
