use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    Set, TransactionTrait,
};
use tracing::debug;
use vanish_domain::storage::{
    Fields, KeyTtl, RecordKey, RecordStore, StorageError, StorageResult, StoreOp, WatchedKey,
};

use crate::entity::{record_fields, records, sequences};
use crate::migration::RECORD_VERSION_SEQUENCE;
use crate::SeaOrmStorage;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_live(header: &records::Model, now: i64) -> bool {
    header.expires_at.map_or(true, |expires_at| expires_at > now)
}

async fn find_header<C: ConnectionTrait>(
    conn: &C,
    key: &str,
) -> StorageResult<Option<records::Model>> {
    records::Entity::find_by_id(key.to_owned())
        .one(conn)
        .await
        .map_err(StorageError::from_source)
}

async fn live_header<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    now: i64,
) -> StorageResult<Option<records::Model>> {
    Ok(find_header(conn, key)
        .await?
        .filter(|header| is_live(header, now)))
}

/// Draws the next header version from the store-wide sequence. Versions
/// never repeat, even across a delete and recreate of the same key.
async fn next_version<C: ConnectionTrait>(conn: &C) -> StorageResult<i64> {
    sequences::Entity::update_many()
        .col_expr(
            sequences::Column::Value,
            Expr::col(sequences::Column::Value).add(1),
        )
        .filter(sequences::Column::Name.eq(RECORD_VERSION_SEQUENCE))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;
    sequences::Entity::find_by_id(RECORD_VERSION_SEQUENCE.to_owned())
        .one(conn)
        .await
        .map_err(StorageError::from_source)?
        .map(|row| row.value)
        .ok_or_else(|| StorageError::Database("record version sequence missing".into()))
}

async fn write_header<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    expires_at: Option<i64>,
) -> StorageResult<()> {
    let version = next_version(conn).await?;
    records::Entity::update_many()
        .col_expr(records::Column::ExpiresAt, Expr::value(expires_at))
        .col_expr(records::Column::Version, Expr::value(version))
        .filter(records::Column::RecordKey.eq(key))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn delete_fields<C: ConnectionTrait>(conn: &C, key: &str) -> StorageResult<()> {
    record_fields::Entity::delete_many()
        .filter(record_fields::Column::RecordKey.eq(key))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn delete_key<C: ConnectionTrait>(conn: &C, key: &str) -> StorageResult<()> {
    delete_fields(conn, key).await?;
    records::Entity::delete_by_id(key.to_owned())
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn hash_set<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    fields: Fields,
    now: i64,
) -> StorageResult<()> {
    if fields.is_empty() {
        return Ok(());
    }

    match find_header(conn, key).await? {
        Some(header) if is_live(&header, now) => {
            write_header(conn, key, header.expires_at).await?;
        }
        Some(_) => {
            // A lapsed key is replaced wholesale, never merged into.
            delete_fields(conn, key).await?;
            write_header(conn, key, None).await?;
        }
        None => {
            let header = records::ActiveModel {
                record_key: Set(key.to_owned()),
                expires_at: Set(None),
                version: Set(next_version(conn).await?),
            };
            records::Entity::insert(header)
                .exec_without_returning(conn)
                .await
                .map_err(StorageError::from_source)?;
        }
    }

    let rows = fields
        .into_iter()
        .map(|(field, value)| record_fields::ActiveModel {
            record_key: Set(key.to_owned()),
            field_name: Set(field),
            field_value: Set(value),
        });
    record_fields::Entity::insert_many(rows)
        .on_conflict(
            OnConflict::columns([record_fields::Column::RecordKey, record_fields::Column::FieldName])
                .update_column(record_fields::Column::FieldValue)
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn hash_delete<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    fields: Vec<String>,
    now: i64,
) -> StorageResult<()> {
    let Some(header) = live_header(conn, key, now).await? else {
        return Ok(());
    };
    if fields.is_empty() {
        return Ok(());
    }

    record_fields::Entity::delete_many()
        .filter(record_fields::Column::RecordKey.eq(key))
        .filter(record_fields::Column::FieldName.is_in(fields))
        .exec(conn)
        .await
        .map_err(StorageError::from_source)?;

    let remaining = record_fields::Entity::find()
        .filter(record_fields::Column::RecordKey.eq(key))
        .count(conn)
        .await
        .map_err(StorageError::from_source)?;
    if remaining == 0 {
        delete_key(conn, key).await
    } else {
        write_header(conn, key, header.expires_at).await
    }
}

async fn expire<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    ttl: Duration,
    now: i64,
) -> StorageResult<()> {
    if live_header(conn, key, now).await?.is_none() {
        return Ok(());
    }
    let expires_at = if ttl.is_zero() {
        None
    } else {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Some(now.saturating_add(millis))
    };
    write_header(conn, key, expires_at).await
}

async fn apply_op<C: ConnectionTrait>(conn: &C, op: StoreOp, now: i64) -> StorageResult<()> {
    match op {
        StoreOp::HashSet { key, fields } => hash_set(conn, key.as_str(), fields, now).await,
        StoreOp::HashDelete { key, fields } => hash_delete(conn, key.as_str(), fields, now).await,
        StoreOp::Expire { key, ttl } => expire(conn, key.as_str(), ttl, now).await,
        StoreOp::Delete { key } => delete_key(conn, key.as_str()).await,
    }
}

#[async_trait::async_trait]
impl RecordStore for SeaOrmStorage {
    async fn hgetall(&self, key: &RecordKey) -> StorageResult<Option<Fields>> {
        let conn = self.connection();
        if live_header(conn, key.as_str(), now_millis()).await?.is_none() {
            return Ok(None);
        }
        let rows = record_fields::Entity::find()
            .filter(record_fields::Column::RecordKey.eq(key.as_str()))
            .all(conn)
            .await
            .map_err(StorageError::from_source)?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            rows.into_iter().map(|row| (row.field_name, row.field_value)).collect(),
        ))
    }

    async fn hget(&self, key: &RecordKey, field: &str) -> StorageResult<Option<String>> {
        let conn = self.connection();
        if live_header(conn, key.as_str(), now_millis()).await?.is_none() {
            return Ok(None);
        }
        let row = record_fields::Entity::find_by_id((key.as_str().to_owned(), field.to_owned()))
            .one(conn)
            .await
            .map_err(StorageError::from_source)?;
        Ok(row.map(|row| row.field_value))
    }

    async fn ttl(&self, key: &RecordKey) -> StorageResult<KeyTtl> {
        let now = now_millis();
        let header = live_header(self.connection(), key.as_str(), now).await?;
        Ok(match header {
            None => KeyTtl::Missing,
            Some(records::Model {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(records::Model {
                expires_at: Some(expires_at),
                ..
            }) => KeyTtl::Expires(Duration::from_millis(
                u64::try_from(expires_at - now).unwrap_or_default(),
            )),
        })
    }

    async fn version(&self, key: &RecordKey) -> StorageResult<Option<u64>> {
        let header = live_header(self.connection(), key.as_str(), now_millis()).await?;
        Ok(header.map(|header| u64::try_from(header.version).unwrap_or_default()))
    }

    async fn execute(&self, ops: Vec<StoreOp>, watched: Vec<WatchedKey>) -> StorageResult<()> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let now = now_millis();

        for watch in &watched {
            let current = live_header(&txn, watch.key.as_str(), now)
                .await?
                .map(|header| u64::try_from(header.version).unwrap_or_default());
            if current != watch.version {
                txn.rollback().await.map_err(StorageError::from_source)?;
                debug!(key = %watch.key, "watched key changed; batch rejected");
                return Err(StorageError::TransactionAborted(watch.key.clone()));
            }
        }

        // An error below drops `txn`, which rolls every op back.
        for op in ops {
            apply_op(&txn, op, now).await?;
        }
        txn.commit().await.map_err(StorageError::from_source)
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let lapsed: Vec<String> = records::Entity::find()
            .select_only()
            .column(records::Column::RecordKey)
            .filter(
                Condition::all()
                    .add(records::Column::ExpiresAt.is_not_null())
                    .add(records::Column::ExpiresAt.lte(now_millis())),
            )
            .into_tuple()
            .all(&txn)
            .await
            .map_err(StorageError::from_source)?;
        if lapsed.is_empty() {
            txn.commit().await.map_err(StorageError::from_source)?;
            return Ok(0);
        }

        record_fields::Entity::delete_many()
            .filter(record_fields::Column::RecordKey.is_in(lapsed.clone()))
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;
        let removed = records::Entity::delete_many()
            .filter(records::Column::RecordKey.is_in(lapsed))
            .exec(&txn)
            .await
            .map_err(StorageError::from_source)?;
        txn.commit().await.map_err(StorageError::from_source)?;
        Ok(removed.rows_affected)
    }
}
