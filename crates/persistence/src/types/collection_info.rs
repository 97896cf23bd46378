//! Collection registry entries and storage formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The encoding a collection uses for every document it stores.
///
/// The format is chosen when the collection is created and never changes.
/// Its text form (`JSON` / `BSON`) is what the registry persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageFormat {
    /// UTF-8 JSON text.
    #[default]
    #[serde(rename = "JSON")]
    Json,
    /// Binary BSON bytes.
    #[serde(rename = "BSON")]
    Bson,
}

impl StorageFormat {
    /// Returns the name stored in the registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageFormat::Json => "JSON",
            StorageFormat::Bson => "BSON",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageFormat {
    type Err = String;

    /// Parses a format name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("json") {
            Ok(StorageFormat::Json)
        } else if s.eq_ignore_ascii_case("bson") {
            Ok(StorageFormat::Bson)
        } else {
            Err(format!("unknown storage format '{s}', expected JSON or BSON"))
        }
    }
}

/// A collection as listed in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name, also the name of its backing table.
    pub name: String,
    /// Encoding of every document in the collection.
    pub format: StorageFormat,
}

impl CollectionInfo {
    /// Creates a registry entry.
    pub fn new(name: impl Into<String>, format: StorageFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }
}

impl fmt::Display for CollectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.format)
    }
}
