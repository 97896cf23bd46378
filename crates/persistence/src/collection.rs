//! Typed views over stored collections.
//!
//! A [`DocumentCollection`] binds a collection name and format to a
//! [`RecordStore`] and applies the [`codec`](crate::codec) on every call.
//! It owns no connection; each call goes through the store, so a view built
//! on a transaction handle runs inside that transaction.
//!
//! ```ignore
//! let widgets = DocumentCollection::<_, Widget>::open(&provider, "Widgets")
//!     .await?
//!     .expect("collection exists");
//! let id = widgets.insert(&Widget { name: "x".into() }).await?;
//! let blue = widgets.filter(|w| w.color == "blue").await?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::codec;
use crate::core::{RecordCursor, RecordStore};
use crate::error::{CollectionError, StorageError, StorageResult};
use crate::store::Document;
use crate::types::{CollectionInfo, Record, StorageFormat};

/// A typed view over one collection.
pub struct DocumentCollection<'s, S: RecordStore + ?Sized, T> {
    store: &'s S,
    info: CollectionInfo,
    _document: PhantomData<fn() -> T>,
}

impl<'s, S: RecordStore + ?Sized, T> DocumentCollection<'s, S, T> {
    /// Binds a view to a registry entry without checking it.
    pub fn new(store: &'s S, info: CollectionInfo) -> Self {
        Self {
            store,
            info,
            _document: PhantomData,
        }
    }

    /// Looks `name` up in the registry and returns a view, or `None` if the
    /// collection does not exist.
    pub async fn open(store: &'s S, name: &str) -> StorageResult<Option<Self>> {
        let info = store.collection_info(name).await?;
        Ok(info.map(|info| Self::new(store, info)))
    }

    /// Returns the collection name as registered.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the storage format of the collection.
    pub fn format(&self) -> StorageFormat {
        self.info.format
    }

    /// Returns the registry entry this view is bound to.
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// Returns an untyped view over the same collection.
    pub fn raw(&self) -> RawCollection<'s, S> {
        RawCollection::new(self.store, self.info.clone())
    }

    /// Deletes the record with this id. Returns true iff one was removed.
    pub async fn remove(&self, id: Uuid) -> StorageResult<bool> {
        self.store.remove_record(id, &self.info.name).await
    }
}

impl<'s, S: RecordStore + ?Sized, T: Document> DocumentCollection<'s, S, T> {
    /// Opens the collection named by `T`.
    pub async fn open_typed(store: &'s S) -> StorageResult<Option<Self>> {
        Self::open(store, T::collection_name()).await
    }
}

impl<S: RecordStore + ?Sized, T: DeserializeOwned> DocumentCollection<'_, S, T> {
    fn decode(&self, record: &Record) -> StorageResult<T> {
        codec::decode_as(&record.data, self.info.format)
    }

    /// Fetches and decodes the document with this id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<T>> {
        match self.store.get_record(id, &self.info.name).await? {
            Some(record) => Ok(Some(self.decode(&record)?)),
            None => Ok(None),
        }
    }

    /// Returns the first document matching `predicate`, in scan order.
    pub async fn find<P>(&self, predicate: P) -> StorageResult<Option<T>>
    where
        P: FnMut(&T) -> bool,
    {
        Ok(self.find_with_key(predicate).await?.map(|(_, doc)| doc))
    }

    /// Like [`find`](Self::find), also returning the document's id.
    ///
    /// The scan stops at the first match and releases its connection before
    /// returning.
    pub async fn find_with_key<P>(&self, mut predicate: P) -> StorageResult<Option<(Uuid, T)>>
    where
        P: FnMut(&T) -> bool,
    {
        let mut cursor = self.store.enumerate_collection(&self.info.name).await?;
        while let Some(record) = cursor.next().await? {
            let doc = self.decode(&record)?;
            if predicate(&doc) {
                cursor.close().await?;
                return Ok(Some((record.id, doc)));
            }
        }
        Ok(None)
    }

    /// Returns whichever document the scan yields first.
    pub async fn first(&self) -> StorageResult<Option<T>> {
        self.find(|_| true).await
    }

    /// Returns every document matching `predicate`.
    pub async fn filter<P>(&self, predicate: P) -> StorageResult<Vec<T>>
    where
        P: FnMut(&T) -> bool,
    {
        let matches = self.filter_with_keys(predicate).await?;
        Ok(matches.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Like [`filter`](Self::filter), keeping the ids.
    pub async fn filter_with_keys<P>(&self, mut predicate: P) -> StorageResult<Vec<(Uuid, T)>>
    where
        P: FnMut(&T) -> bool,
    {
        let mut cursor = self.store.enumerate_collection(&self.info.name).await?;
        let mut matches = Vec::new();
        while let Some(record) = cursor.next().await? {
            let doc = self.decode(&record)?;
            if predicate(&doc) {
                matches.push((record.id, doc));
            }
        }
        Ok(matches)
    }

    /// Returns every document in the collection.
    pub async fn all(&self) -> StorageResult<Vec<T>> {
        self.filter(|_| true).await
    }

    /// Opens a lazy cursor that decodes documents as they are read.
    pub async fn iter(&self) -> StorageResult<DocumentCursor<T>> {
        let records = self.store.enumerate_collection(&self.info.name).await?;
        Ok(DocumentCursor {
            records,
            format: self.info.format,
            _document: PhantomData,
        })
    }
}

impl<S: RecordStore + ?Sized, T: Serialize> DocumentCollection<'_, S, T> {
    /// Encodes `value` and stores it under `id`, replacing any previous value.
    pub async fn add_or_update(&self, id: Uuid, value: &T) -> StorageResult<bool> {
        let data = codec::encode(value, self.info.format)?;
        self.store
            .add_or_update_record(&Record::new(id, data), &self.info.name)
            .await
    }

    /// Stores `value` under a fresh id and returns the id.
    pub async fn insert(&self, value: &T) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        self.add_or_update(id, value).await?;
        Ok(id)
    }
}

impl<S: RecordStore + ?Sized, T> Clone for DocumentCollection<'_, S, T> {
    fn clone(&self) -> Self {
        Self::new(self.store, self.info.clone())
    }
}

impl<S: RecordStore + ?Sized, T> fmt::Debug for DocumentCollection<'_, S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCollection")
            .field("backend", &self.store.backend_name())
            .field("name", &self.info.name)
            .field("format", &self.info.format)
            .finish()
    }
}

/// A cursor that decodes each record of a collection as it is read.
///
/// Dropping it part way releases the underlying connection.
pub struct DocumentCursor<T> {
    records: RecordCursor,
    format: StorageFormat,
    _document: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DocumentCursor<T> {
    /// Returns the next document and its id.
    pub async fn next(&mut self) -> StorageResult<Option<(Uuid, T)>> {
        match self.records.next().await? {
            Some(record) => {
                let doc = codec::decode_as(&record.data, self.format)?;
                Ok(Some((record.id, doc)))
            }
            None => Ok(None),
        }
    }
}

impl<T> DocumentCursor<T> {
    /// Stops reading and waits until the connection is released.
    pub async fn close(self) -> StorageResult<()> {
        self.records.close().await
    }

    /// Returns true once the cursor has released its connection.
    pub fn is_finished(&self) -> bool {
        self.records.is_finished()
    }
}

impl<T> fmt::Debug for DocumentCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCursor")
            .field("format", &self.format)
            .field("records", &self.records)
            .finish()
    }
}

/// An untyped view over one collection, working on encoded records.
pub struct RawCollection<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    info: CollectionInfo,
}

impl<'s, S: RecordStore + ?Sized> RawCollection<'s, S> {
    /// Binds a view to a registry entry without checking it.
    pub fn new(store: &'s S, info: CollectionInfo) -> Self {
        Self { store, info }
    }

    /// Looks `name` up in the registry.
    pub async fn open(store: &'s S, name: &str) -> StorageResult<Option<Self>> {
        let info = store.collection_info(name).await?;
        Ok(info.map(|info| Self::new(store, info)))
    }

    /// Returns the collection name as registered.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the storage format of the collection.
    pub fn format(&self) -> StorageFormat {
        self.info.format
    }

    /// Fetches the encoded record with this id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<Record>> {
        self.store.get_record(id, &self.info.name).await
    }

    /// Inserts or replaces an encoded record.
    ///
    /// The payload must already be in the collection's format.
    pub async fn put(&self, record: &Record) -> StorageResult<bool> {
        if record.format() != self.info.format {
            return Err(StorageError::Collection(CollectionError::FormatMismatch {
                collection: self.info.name.clone(),
                expected: self.info.format,
                actual: record.format(),
            }));
        }
        self.store.add_or_update_record(record, &self.info.name).await
    }

    /// Deletes the record with this id.
    pub async fn remove(&self, id: Uuid) -> StorageResult<bool> {
        self.store.remove_record(id, &self.info.name).await
    }

    /// Opens a cursor over the encoded records.
    pub async fn scan(&self) -> StorageResult<RecordCursor> {
        self.store.enumerate_collection(&self.info.name).await
    }

    /// Returns a typed view over the same collection.
    pub fn typed<T>(&self) -> DocumentCollection<'s, S, T> {
        DocumentCollection::new(self.store, self.info.clone())
    }
}

impl<S: RecordStore + ?Sized> Clone for RawCollection<'_, S> {
    fn clone(&self) -> Self {
        Self::new(self.store, self.info.clone())
    }
}

impl<S: RecordStore + ?Sized> fmt::Debug for RawCollection<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCollection")
            .field("backend", &self.store.backend_name())
            .field("name", &self.info.name)
            .field("format", &self.info.format)
            .finish()
    }
}
