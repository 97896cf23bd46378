//! PostgreSQL schema definitions.

use tokio_postgres::Client;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::registry::{REGISTRY_TABLE, quote_identifier};
use crate::types::StorageFormat;

fn schema_error(message: String, err: tokio_postgres::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "postgres".to_string(),
        message,
        source: Some(Box::new(err)),
    })
}

/// Creates the collection registry if it does not exist yet.
pub async fn initialize_schema(client: &Client) -> StorageResult<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            \"Name\" TEXT PRIMARY KEY,
            \"Format\" TEXT NOT NULL
        )",
        quote_identifier(REGISTRY_TABLE)
    );
    client
        .batch_execute(&sql)
        .await
        .map_err(|e| schema_error("Failed to create collection registry".to_string(), e))
}

/// Returns the DDL for a collection's backing table.
pub(crate) fn collection_table_sql(name: &str, format: StorageFormat) -> String {
    let column_type = match format {
        StorageFormat::Json => "TEXT",
        StorageFormat::Bson => "BYTEA",
    };
    format!(
        "CREATE TABLE {} (\"Id\" UUID PRIMARY KEY, \"Data\" {} NOT NULL)",
        quote_identifier(name),
        column_type
    )
}

/// Creates the backing table for a collection.
pub(crate) async fn create_collection_table(
    client: &Client,
    name: &str,
    format: StorageFormat,
) -> StorageResult<()> {
    client
        .batch_execute(&collection_table_sql(name, format))
        .await
        .map_err(|e| schema_error(format!("Failed to create table for collection '{}'", name), e))
}

/// Drops a collection's backing table if present.
pub(crate) async fn drop_collection_table(client: &Client, name: &str) -> StorageResult<()> {
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(name)))
        .await
        .map_err(|e| schema_error(format!("Failed to drop table for collection '{}'", name), e))
}
