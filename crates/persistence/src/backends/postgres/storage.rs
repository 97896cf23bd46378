//! Record storage for the PostgreSQL backend.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{RecordCursor, RecordStore};
use crate::error::{CollectionError, StorageError, StorageResult};
use crate::registry::{self, REGISTRY_TABLE, quote_identifier};
use crate::types::{CollectionInfo, Record, RecordData, StorageFormat};

use super::PostgresProvider;
use super::schema;

fn entry_from_row(row: &Row) -> StorageResult<CollectionInfo> {
    let name: String = row.try_get(0)?;
    let format: String = row.try_get(1)?;
    registry::parse_entry(name, &format)
}

/// Reads an `("Id", "Data")` row. `TEXT` payloads are JSON, `BYTEA` is BSON.
fn record_from_row(row: &Row) -> StorageResult<Record> {
    let id: Uuid = row.try_get(0)?;
    let data = if *row.columns()[1].type_() == Type::BYTEA {
        RecordData::Bson(row.try_get(1)?)
    } else {
        RecordData::Json(row.try_get(1)?)
    };
    Ok(Record::new(id, data))
}

pub(crate) async fn collection_info(client: &Client, name: &str) -> StorageResult<Option<CollectionInfo>> {
    let sql = format!(
        "SELECT \"Name\", \"Format\" FROM {} WHERE \"Name\" = $1",
        quote_identifier(REGISTRY_TABLE)
    );
    let row = client.query_opt(sql.as_str(), &[&name]).await?;
    row.as_ref().map(entry_from_row).transpose()
}

pub(crate) async fn collection_infos(client: &Client) -> StorageResult<Vec<CollectionInfo>> {
    let sql = format!(
        "SELECT \"Name\", \"Format\" FROM {} ORDER BY \"Name\"",
        quote_identifier(REGISTRY_TABLE)
    );
    let rows = client.query(sql.as_str(), &[]).await?;
    rows.iter().map(entry_from_row).collect()
}

pub(crate) async fn require_collection(client: &Client, collection: &str) -> StorageResult<CollectionInfo> {
    collection_info(client, collection).await?.ok_or_else(|| {
        StorageError::Collection(CollectionError::NotFound {
            name: collection.to_string(),
        })
    })
}

/// Creates the table and the registry row. The caller supplies atomicity.
pub(crate) async fn create_collection(
    client: &Client,
    name: &str,
    format: StorageFormat,
) -> StorageResult<()> {
    if collection_info(client, name).await?.is_some() {
        return Err(StorageError::Collection(CollectionError::AlreadyExists {
            name: name.to_string(),
        }));
    }

    schema::create_collection_table(client, name, format).await?;
    let sql = format!(
        "INSERT INTO {} (\"Name\", \"Format\") VALUES ($1, $2)",
        quote_identifier(REGISTRY_TABLE)
    );
    client.execute(sql.as_str(), &[&name, &format.as_str()]).await?;
    Ok(())
}

/// Drops the table and the registry row. The caller supplies atomicity.
pub(crate) async fn delete_collection(client: &Client, name: &str) -> StorageResult<bool> {
    if collection_info(client, name).await?.is_none() {
        return Ok(false);
    }

    schema::drop_collection_table(client, name).await?;
    let sql = format!(
        "DELETE FROM {} WHERE \"Name\" = $1",
        quote_identifier(REGISTRY_TABLE)
    );
    client.execute(sql.as_str(), &[&name]).await?;
    Ok(true)
}

pub(crate) async fn get_record(client: &Client, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
    require_collection(client, collection).await?;
    let sql = format!(
        "SELECT \"Id\", \"Data\" FROM {} WHERE \"Id\" = $1",
        quote_identifier(collection)
    );
    let row = client.query_opt(sql.as_str(), &[&id]).await?;
    row.as_ref().map(record_from_row).transpose()
}

pub(crate) async fn upsert_record(client: &Client, record: &Record, collection: &str) -> StorageResult<bool> {
    let info = require_collection(client, collection).await?;
    if record.format() != info.format {
        return Err(StorageError::Collection(CollectionError::FormatMismatch {
            collection: info.name,
            expected: info.format,
            actual: record.format(),
        }));
    }

    let sql = format!(
        "INSERT INTO {} (\"Id\", \"Data\") VALUES ($1, $2)
         ON CONFLICT (\"Id\") DO UPDATE SET \"Data\" = EXCLUDED.\"Data\"",
        quote_identifier(collection)
    );
    let params: [&(dyn ToSql + Sync); 2] = match &record.data {
        RecordData::Json(text) => [&record.id, text],
        RecordData::Bson(bytes) => [&record.id, bytes],
    };
    let written = client.execute(sql.as_str(), &params).await?;
    Ok(written > 0)
}

pub(crate) async fn remove_record(client: &Client, id: Uuid, collection: &str) -> StorageResult<bool> {
    require_collection(client, collection).await?;
    let sql = format!("DELETE FROM {} WHERE \"Id\" = $1", quote_identifier(collection));
    let removed = client.execute(sql.as_str(), &[&id]).await?;
    Ok(removed > 0)
}

/// Starts streaming every row of `collection`.
///
/// Rows arrive on `client`'s connection, so whoever consumes the stream must
/// keep that connection checked out until it ends.
pub(crate) async fn stream_records(
    client: &Client,
    collection: &str,
) -> StorageResult<BoxStream<'static, StorageResult<Record>>> {
    let sql = format!("SELECT \"Id\", \"Data\" FROM {}", quote_identifier(collection));
    let rows = client
        .query_raw(sql.as_str(), std::iter::empty::<String>())
        .await?;
    Ok(rows
        .map(|row| {
            row.map_err(StorageError::from)
                .and_then(|row| record_from_row(&row))
        })
        .boxed())
}

#[async_trait]
impl RecordStore for PostgresProvider {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        let client = self.get_client().await?;
        Ok(collection_info(&client, name).await?.is_some())
    }

    async fn collection_info(&self, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let client = self.get_client().await?;
        collection_info(&client, name).await
    }

    async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>> {
        let client = self.get_client().await?;
        collection_infos(&client).await
    }

    async fn create_collection(&self, name: &str, format: StorageFormat) -> StorageResult<()> {
        registry::validate_collection_name(name)?;
        self.ensure_no_transaction()?;

        let client = self.get_client().await?;
        client.batch_execute("BEGIN").await?;
        match create_collection(&client, name, format).await {
            Ok(()) => client.batch_execute("COMMIT").await?,
            Err(e) => {
                if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                    warn!(error = %rollback_err, "Rollback after failed create failed");
                }
                return Err(e);
            }
        }

        info!(collection = %name, format = %format, "Created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StorageResult<bool> {
        self.ensure_no_transaction()?;

        let client = self.get_client().await?;
        client.batch_execute("BEGIN").await?;
        let deleted = match delete_collection(&client, name).await {
            Ok(deleted) => {
                client.batch_execute("COMMIT").await?;
                deleted
            }
            Err(e) => {
                if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                    warn!(error = %rollback_err, "Rollback after failed delete failed");
                }
                return Err(e);
            }
        };

        if deleted {
            info!(collection = %name, "Deleted collection");
        }
        Ok(deleted)
    }

    async fn get_record(&self, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
        let client = self.get_client().await?;
        get_record(&client, id, collection).await
    }

    async fn enumerate_collection(&self, collection: &str) -> StorageResult<RecordCursor> {
        let client = self.get_client().await?;
        require_collection(&client, collection).await?;
        let rows = stream_records(&client, collection).await?;
        debug!(collection = %collection, "Opened PostgreSQL cursor");
        Ok(RecordCursor::from_stream(rows, client))
    }

    async fn add_or_update_record(&self, record: &Record, collection: &str) -> StorageResult<bool> {
        let client = self.get_client().await?;
        upsert_record(&client, record, collection).await
    }

    async fn remove_record(&self, id: Uuid, collection: &str) -> StorageResult<bool> {
        let client = self.get_client().await?;
        remove_record(&client, id, collection).await
    }
}
