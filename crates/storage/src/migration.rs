use sea_orm::sea_query::{ColumnDef, Index, OnConflict, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, Set};

use vanish_domain::storage::{StorageError, StorageResult};

use crate::entity::{feedback, record_fields, records, sequences};

/// Sequence backing record header versions.
pub(crate) const RECORD_VERSION_SEQUENCE: &str = "record_version";

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let records_table = Table::create()
        .if_not_exists()
        .table(records::Entity)
        .col(
            ColumnDef::new(records::Column::RecordKey)
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(records::Column::ExpiresAt)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(records::Column::Version)
                .big_integer()
                .not_null()
                .default(0),
        )
        .to_owned();
    create_table(db, backend, records_table).await?;

    let fields_table = Table::create()
        .if_not_exists()
        .table(record_fields::Entity)
        .col(
            ColumnDef::new(record_fields::Column::RecordKey)
                .string_len(255)
                .not_null(),
        )
        .col(
            ColumnDef::new(record_fields::Column::FieldName)
                .string_len(255)
                .not_null(),
        )
        .col(ColumnDef::new(record_fields::Column::FieldValue).text().not_null())
        .primary_key(
            Index::create()
                .col(record_fields::Column::RecordKey)
                .col(record_fields::Column::FieldName),
        )
        .to_owned();
    create_table(db, backend, fields_table).await?;

    let feedback_table = Table::create()
        .if_not_exists()
        .table(feedback::Entity)
        .col(
            ColumnDef::new(feedback::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(feedback::Column::Message).text().not_null())
        .col(
            ColumnDef::new(feedback::Column::ReceivedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, feedback_table).await?;

    let sequences_table = Table::create()
        .if_not_exists()
        .table(sequences::Entity)
        .col(
            ColumnDef::new(sequences::Column::Name)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(sequences::Column::Value)
                .big_integer()
                .not_null()
                .default(0),
        )
        .to_owned();
    create_table(db, backend, sequences_table).await?;

    sequences::Entity::insert(sequences::ActiveModel {
        name: Set(RECORD_VERSION_SEQUENCE.to_owned()),
        value: Set(0),
    })
    .on_conflict(
        OnConflict::column(sequences::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(StorageError::from_source)?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
