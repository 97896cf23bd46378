//! Error types for the persistence layer.
//!
//! Errors are grouped by what went wrong: collection registry rules,
//! transaction lifecycle, provider resolution, and the database itself.
//! Absence is never an error here; lookups return `Ok(None)` or `Ok(false)`.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::StorageFormat;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Collection registry errors
    #[error(transparent)]
    Collection(#[from] CollectionError),

    /// Transaction lifecycle errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Provider resolution errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised by the collection registry rules.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// The name is empty or collides with the reserved registry table.
    #[error("invalid collection name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The registry already lists a collection with this name.
    #[error("collection already exists: {name}")]
    AlreadyExists { name: String },

    /// A record operation named a collection the registry does not list.
    #[error("collection not found: {name}")]
    NotFound { name: String },

    /// Raw data was written to a collection bound to a different format.
    #[error("collection '{collection}' stores {expected} records, got {actual}")]
    FormatMismatch {
        collection: String,
        expected: StorageFormat,
        actual: StorageFormat,
    },
}

/// Errors related to transaction lifecycle.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The provider already has a live transaction handle.
    #[error("there is already an open transaction on this provider")]
    AlreadyActive,

    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,

    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// The transaction's connection is held by an open cursor.
    #[error("transaction connection is busy with an open cursor")]
    ConnectionBusy,
}

/// Errors raised while resolving a provider by name.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No constructor is registered under this name.
    #[error("no provider registered under '{name}'")]
    NotRegistered { name: String },

    /// The constructor ran but could not produce a provider.
    #[error("failed to load provider '{name}': {source}")]
    LoadFailed {
        name: String,
        #[source]
        source: Box<StorageError>,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// A registry row could not be interpreted.
    #[error("registry entry for '{name}' is corrupt: {message}")]
    CorruptRegistry { name: String, message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<bson::ser::Error> for StorageError {
    fn from(err: bson::ser::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<bson::de::Error> for StorageError {
    fn from(err: bson::de::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "postgres".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "postgres".to_string(),
            message: err.to_string(),
        })
    }
}
