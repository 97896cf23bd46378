//! Record storage contract.
//!
//! This module defines the [`RecordStore`] trait, the collection and record
//! operations every backend exposes. Both a provider and a live transaction
//! handle implement it: calls on a provider run in autocommit mode, calls on a
//! handle run inside its transaction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::types::{CollectionInfo, Record, StorageFormat};

use super::cursor::RecordCursor;

/// Collection and record operations against one database.
///
/// # Registry semantics
///
/// A collection exists iff the registry lists it. `create_collection` and
/// `delete_collection` change the registry row and the backing table as one
/// atomic unit: either both changes apply or neither does.
///
/// # Absence
///
/// Looking up something that is not there is not an error. Missing records
/// come back as `Ok(None)`, removing a missing id returns `Ok(false)`.
///
/// # Example
///
/// ```ignore
/// use docsql_persistence::core::RecordStore;
/// use docsql_persistence::types::{Record, RecordData, StorageFormat};
/// use uuid::Uuid;
///
/// async fn example<S: RecordStore + ?Sized>(store: &S) -> docsql_persistence::StorageResult<()> {
///     store.create_collection("Widgets", StorageFormat::Json).await?;
///
///     let id = Uuid::new_v4();
///     let record = Record::new(id, RecordData::Json(r#"{"name":"a"}"#.into()));
///     store.add_or_update_record(&record, "Widgets").await?;
///
///     assert!(store.get_record(id, "Widgets").await?.is_some());
///     assert!(store.remove_record(id, "Widgets").await?);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Returns true iff the registry lists `name`.
    async fn collection_exists(&self, name: &str) -> StorageResult<bool>;

    /// Returns the registry entry for `name`, if any.
    async fn collection_info(&self, name: &str) -> StorageResult<Option<CollectionInfo>>;

    /// Returns every registry entry, ordered by name.
    async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>>;

    /// Creates the backing table and registers the collection.
    ///
    /// # Errors
    ///
    /// * `CollectionError::InvalidName` if `name` is empty or reserved
    /// * `CollectionError::AlreadyExists` if the registry already lists `name`
    /// * A backend error if table creation or registration fails; nothing is
    ///   left behind in that case
    /// * `TransactionError::AlreadyActive` when called on a provider whose
    ///   transaction handle is live; run it through the handle instead
    async fn create_collection(&self, name: &str, format: StorageFormat) -> StorageResult<()>;

    /// Drops the backing table and unregisters the collection.
    ///
    /// Returns `Ok(false)` when the registry does not list `name` (nothing to
    /// do), `Ok(true)` when the collection was removed.
    /// Like [`create_collection`](Self::create_collection), a provider with a
    /// live transaction handle refuses it with `TransactionError::AlreadyActive`.
    async fn delete_collection(&self, name: &str) -> StorageResult<bool>;

    /// Fetches one record by id.
    async fn get_record(&self, id: Uuid, collection: &str) -> StorageResult<Option<Record>>;

    /// Opens a lazy cursor over every record in the collection.
    ///
    /// Order is unspecified. The cursor holds a connection (or the
    /// transaction's connection) until it is exhausted, closed, or dropped.
    async fn enumerate_collection(&self, collection: &str) -> StorageResult<RecordCursor>;

    /// Inserts the record, or replaces the payload of the record with the same id.
    ///
    /// Returns true when a row was written.
    async fn add_or_update_record(&self, record: &Record, collection: &str) -> StorageResult<bool>;

    /// Deletes the record with this id. Returns true iff a row was removed.
    async fn remove_record(&self, id: Uuid, collection: &str) -> StorageResult<bool>;
}
