//! Stored records.

use uuid::Uuid;

use super::StorageFormat;

/// The encoded payload of a record.
///
/// The variant always matches the owning collection's [`StorageFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// JSON text.
    Json(String),
    /// BSON document bytes.
    Bson(Vec<u8>),
}

impl RecordData {
    /// Returns the format this payload is encoded in.
    pub fn format(&self) -> StorageFormat {
        match self {
            RecordData::Json(_) => StorageFormat::Json,
            RecordData::Bson(_) => StorageFormat::Bson,
        }
    }

    /// Returns the raw bytes of the payload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RecordData::Json(text) => text.as_bytes(),
            RecordData::Bson(bytes) => bytes,
        }
    }

    /// Returns the payload size in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One document as stored in a collection table: an id and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique within the collection.
    pub id: Uuid,
    /// Encoded document.
    pub data: RecordData,
}

impl Record {
    /// Creates a record.
    pub fn new(id: Uuid, data: RecordData) -> Self {
        Self { id, data }
    }

    /// Returns the payload's format.
    pub fn format(&self) -> StorageFormat {
        self.data.format()
    }
}
