//! SQLite schema definitions.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::registry::{REGISTRY_TABLE, quote_identifier};
use crate::types::StorageFormat;

fn schema_error(message: String, err: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: Some(Box::new(err)),
    })
}

/// Creates the collection registry if it does not exist yet.
///
/// Registry names compare without regard to case, matching how SQLite
/// resolves the table names they stand for.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            \"Name\" TEXT PRIMARY KEY NOT NULL COLLATE NOCASE,
            \"Format\" TEXT NOT NULL
        )",
        quote_identifier(REGISTRY_TABLE)
    );
    conn.execute_batch(&sql)
        .map_err(|e| schema_error("Failed to create collection registry".to_string(), e))
}

/// Returns the DDL for a collection's backing table.
pub(crate) fn collection_table_sql(name: &str, format: StorageFormat) -> String {
    let (column_type, value_type) = match format {
        StorageFormat::Json => ("TEXT", "text"),
        StorageFormat::Bson => ("BLOB", "blob"),
    };
    format!(
        "CREATE TABLE {table} (
            \"Id\" TEXT PRIMARY KEY NOT NULL,
            \"Data\" {column_type} NOT NULL CHECK (typeof(\"Data\") = '{value_type}')
        )",
        table = quote_identifier(name),
    )
}

/// Creates the backing table for a collection.
///
/// Fails if a table with that name already exists, registered or not.
pub(crate) fn create_collection_table(
    conn: &Connection,
    name: &str,
    format: StorageFormat,
) -> StorageResult<()> {
    conn.execute_batch(&collection_table_sql(name, format))
        .map_err(|e| schema_error(format!("Failed to create table for collection '{}'", name), e))
}

/// Drops a collection's backing table if present.
pub(crate) fn drop_collection_table(conn: &Connection, name: &str) -> StorageResult<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))
        .map_err(|e| schema_error(format!("Failed to drop table for collection '{}'", name), e))
}
