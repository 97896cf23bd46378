//! Document encoding.
//!
//! Converts typed documents to and from the payload a collection stores,
//! according to the collection's [`StorageFormat`]. Encoding is a pure
//! function of the document and the format.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::{RecordData, StorageFormat};

/// Encodes a document in the given format.
///
/// BSON requires the document to serialize as a map at the top level.
pub fn encode<T: Serialize>(value: &T, format: StorageFormat) -> StorageResult<RecordData> {
    match format {
        StorageFormat::Json => Ok(RecordData::Json(serde_json::to_string(value)?)),
        StorageFormat::Bson => Ok(RecordData::Bson(bson::to_vec(value)?)),
    }
}

/// Decodes a stored payload into a document.
///
/// The payload's own encoding decides how it is parsed; `T` decides the shape.
pub fn decode<T: DeserializeOwned>(data: &RecordData) -> StorageResult<T> {
    match data {
        RecordData::Json(text) => Ok(serde_json::from_str(text)?),
        RecordData::Bson(bytes) => Ok(bson::from_slice(bytes)?),
    }
}

/// Decodes a payload, requiring it to be in `expected` format.
pub fn decode_as<T: DeserializeOwned>(data: &RecordData, expected: StorageFormat) -> StorageResult<T> {
    if data.format() != expected {
        return Err(StorageError::Backend(BackendError::SerializationError {
            message: format!(
                "expected {} payload, found {}",
                expected,
                data.format()
            ),
        }));
    }
    decode(data)
}
