//! Core types for the persistence layer.
//!
//! - [`StorageFormat`] - how a collection encodes its documents
//! - [`CollectionInfo`] - a registry entry: collection name and format
//! - [`Record`], [`RecordData`] - a stored document as an id plus encoded payload
//!
//! # Examples
//!
//! ```
//! use docsql_persistence::types::{CollectionInfo, Record, RecordData, StorageFormat};
//! use uuid::Uuid;
//!
//! let info = CollectionInfo::new("Widgets", StorageFormat::Json);
//! assert_eq!(info.to_string(), "Widgets (JSON)");
//!
//! let record = Record::new(Uuid::new_v4(), RecordData::Json(r#"{"a":1}"#.to_string()));
//! assert_eq!(record.format(), StorageFormat::Json);
//! ```

mod collection_info;
mod record;

pub use collection_info::{CollectionInfo, StorageFormat};
pub use record::{Record, RecordData};
