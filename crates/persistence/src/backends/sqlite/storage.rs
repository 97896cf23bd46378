//! Record storage for the SQLite backend.
//!
//! The free functions here run against any connection: a pooled autocommit
//! connection, a connection inside `BEGIN IMMEDIATE`, or a savepoint. The
//! provider and transaction types decide which.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{RecordCursor, RecordStore};
use crate::error::{BackendError, CollectionError, StorageError, StorageResult};
use crate::registry::{self, REGISTRY_TABLE, quote_identifier};
use crate::types::{CollectionInfo, Record, RecordData, StorageFormat};

use super::SqliteProvider;
use super::schema;

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn not_found(collection: &str) -> StorageError {
    StorageError::Collection(CollectionError::NotFound {
        name: collection.to_string(),
    })
}

/// Reads an `("Id", "Data")` row. Text payloads are JSON, blobs are BSON.
fn record_from_row(row: &Row<'_>) -> StorageResult<Record> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| internal_error(format!("Invalid record id '{}': {}", id, e)))?;
    let data = match row.get_ref(1)? {
        ValueRef::Text(text) => RecordData::Json(
            String::from_utf8(text.to_vec())
                .map_err(|e| internal_error(format!("Record {} is not UTF-8: {}", id, e)))?,
        ),
        ValueRef::Blob(bytes) => RecordData::Bson(bytes.to_vec()),
        other => {
            return Err(internal_error(format!(
                "Record {} has unexpected payload type {:?}",
                id,
                other.data_type()
            )));
        }
    };
    Ok(Record::new(id, data))
}

pub(crate) fn collection_info(conn: &Connection, name: &str) -> StorageResult<Option<CollectionInfo>> {
    let sql = format!(
        "SELECT \"Name\", \"Format\" FROM {} WHERE \"Name\" = ?1",
        quote_identifier(REGISTRY_TABLE)
    );
    let row = conn
        .query_row(&sql, params![name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .optional()?;
    row.map(|(name, format)| registry::parse_entry(name, &format))
        .transpose()
}

pub(crate) fn collection_infos(conn: &Connection) -> StorageResult<Vec<CollectionInfo>> {
    let sql = format!(
        "SELECT \"Name\", \"Format\" FROM {} ORDER BY \"Name\"",
        quote_identifier(REGISTRY_TABLE)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut infos = Vec::new();
    for row in rows {
        let (name, format) = row?;
        infos.push(registry::parse_entry(name, &format)?);
    }
    Ok(infos)
}

/// Creates the table and the registry row. The caller supplies atomicity.
pub(crate) fn create_collection(
    conn: &Connection,
    name: &str,
    format: StorageFormat,
) -> StorageResult<()> {
    if collection_info(conn, name)?.is_some() {
        return Err(StorageError::Collection(CollectionError::AlreadyExists {
            name: name.to_string(),
        }));
    }

    schema::create_collection_table(conn, name, format)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (\"Name\", \"Format\") VALUES (?1, ?2)",
            quote_identifier(REGISTRY_TABLE)
        ),
        params![name, format.as_str()],
    )?;
    Ok(())
}

/// Drops the table and the registry row. The caller supplies atomicity.
pub(crate) fn delete_collection(conn: &Connection, name: &str) -> StorageResult<bool> {
    // Use the registered spelling; SQLite matched it case-insensitively.
    let Some(info) = collection_info(conn, name)? else {
        return Ok(false);
    };

    schema::drop_collection_table(conn, &info.name)?;
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE \"Name\" = ?1",
            quote_identifier(REGISTRY_TABLE)
        ),
        params![info.name],
    )?;
    Ok(true)
}

/// Fails with `NotFound` unless the registry lists `collection`.
pub(crate) fn require_collection(conn: &Connection, collection: &str) -> StorageResult<CollectionInfo> {
    collection_info(conn, collection)?.ok_or_else(|| not_found(collection))
}

pub(crate) fn get_record(conn: &Connection, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
    require_collection(conn, collection)?;
    let sql = format!(
        "SELECT \"Id\", \"Data\" FROM {} WHERE \"Id\" = ?1",
        quote_identifier(collection)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(record_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn upsert_record(conn: &Connection, record: &Record, collection: &str) -> StorageResult<bool> {
    let info = require_collection(conn, collection)?;
    if record.format() != info.format {
        return Err(StorageError::Collection(CollectionError::FormatMismatch {
            collection: info.name,
            expected: info.format,
            actual: record.format(),
        }));
    }

    let sql = format!(
        "INSERT INTO {} (\"Id\", \"Data\") VALUES (?1, ?2)
         ON CONFLICT (\"Id\") DO UPDATE SET \"Data\" = excluded.\"Data\"",
        quote_identifier(collection)
    );
    let id = record.id.to_string();
    let written = match &record.data {
        RecordData::Json(text) => conn.execute(&sql, params![id, text])?,
        RecordData::Bson(bytes) => conn.execute(&sql, params![id, bytes])?,
    };
    Ok(written > 0)
}

pub(crate) fn remove_record(conn: &Connection, id: Uuid, collection: &str) -> StorageResult<bool> {
    require_collection(conn, collection)?;
    let sql = format!("DELETE FROM {} WHERE \"Id\" = ?1", quote_identifier(collection));
    let removed = conn.execute(&sql, params![id.to_string()])?;
    Ok(removed > 0)
}

/// Steps through every row of `collection`, handing each to `sender`.
///
/// Stops at the first error or when the receiving cursor goes away. Runs on
/// a blocking thread; `blocking_send` parks it until the cursor asks for more.
pub(crate) fn stream_records(
    conn: &Connection,
    collection: &str,
    sender: &mpsc::Sender<StorageResult<Record>>,
) {
    let sql = format!("SELECT \"Id\", \"Data\" FROM {}", quote_identifier(collection));
    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = sender.blocking_send(Err(e.into()));
            return;
        }
    };
    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = sender.blocking_send(Err(e.into()));
            return;
        }
    };

    loop {
        let item = match rows.next() {
            Ok(Some(row)) => record_from_row(row),
            Ok(None) => break,
            Err(e) => Err(e.into()),
        };
        let failed = item.is_err();
        if sender.blocking_send(item).is_err() || failed {
            break;
        }
    }
}

#[async_trait]
impl RecordStore for SqliteProvider {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        Ok(collection_info(&conn, name)?.is_some())
    }

    async fn collection_info(&self, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let conn = self.get_connection()?;
        collection_info(&conn, name)
    }

    async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>> {
        let conn = self.get_connection()?;
        collection_infos(&conn)
    }

    async fn create_collection(&self, name: &str, format: StorageFormat) -> StorageResult<()> {
        registry::validate_collection_name(name)?;
        self.ensure_no_transaction()?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        create_collection(&tx, name, format)?;
        tx.commit()?;

        info!(collection = %name, format = %format, "Created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StorageResult<bool> {
        self.ensure_no_transaction()?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = delete_collection(&tx, name)?;
        tx.commit()?;

        if deleted {
            info!(collection = %name, "Deleted collection");
        }
        Ok(deleted)
    }

    async fn get_record(&self, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
        let conn = self.get_connection()?;
        get_record(&conn, id, collection)
    }

    async fn enumerate_collection(&self, collection: &str) -> StorageResult<RecordCursor> {
        let conn = self.get_connection()?;
        require_collection(&conn, collection)?;

        let (sender, receiver) = mpsc::channel(1);
        let collection = collection.to_string();
        let producer = tokio::task::spawn_blocking(move || {
            stream_records(&conn, &collection, &sender);
            // Return the connection before the cursor can observe the end.
            drop(conn);
            drop(sender);
        });
        debug!("Opened SQLite cursor");
        Ok(RecordCursor::from_channel(receiver, producer))
    }

    async fn add_or_update_record(&self, record: &Record, collection: &str) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        upsert_record(&conn, record, collection)
    }

    async fn remove_record(&self, id: Uuid, collection: &str) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        remove_record(&conn, id, collection)
    }
}
