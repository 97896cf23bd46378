//! Collection registry rules shared by every backend.
//!
//! Each database holds one registry table, [`REGISTRY_TABLE`], with a row per
//! collection (`Name`, `Format`). A collection exists exactly when its row
//! exists; the backing table is named after the collection.

use crate::error::{BackendError, CollectionError, StorageResult};
use crate::types::{CollectionInfo, StorageFormat};

/// Name of the registry table. Never usable as a collection name.
pub const REGISTRY_TABLE: &str = "_collections";

/// Checks that `name` may be used for a new collection.
///
/// The reserved registry name is rejected in any letter case, since SQLite
/// resolves table names without regard to case.
pub fn validate_collection_name(name: &str) -> Result<(), CollectionError> {
    if name.is_empty() {
        return Err(CollectionError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty".to_string(),
        });
    }
    if name.eq_ignore_ascii_case(REGISTRY_TABLE) {
        return Err(CollectionError::InvalidName {
            name: name.to_string(),
            reason: format!("'{REGISTRY_TABLE}' is reserved for the collection registry"),
        });
    }
    if name.contains('\0') {
        return Err(CollectionError::InvalidName {
            name: name.to_string(),
            reason: "name must not contain NUL characters".to_string(),
        });
    }
    Ok(())
}

/// Quotes an identifier for use in SQL, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds a registry entry from a stored row.
pub(crate) fn parse_entry(name: String, format: &str) -> StorageResult<CollectionInfo> {
    let format = format.parse::<StorageFormat>().map_err(|message| {
        BackendError::CorruptRegistry {
            name: name.clone(),
            message,
        }
    })?;
    Ok(CollectionInfo::new(name, format))
}
