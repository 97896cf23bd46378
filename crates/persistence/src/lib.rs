//! DocSQL Persistence Layer
//!
//! This crate stores schema-less document collections in ordinary relational
//! databases. Each collection is a two-column table (`Id`, `Data`) holding
//! JSON text or BSON bytes, and a registry table (`_collections`) records
//! which collections exist and how they are encoded.
//!
//! # Features
//!
//! - **Multiple Backends**: SQLite and PostgreSQL behind one async contract
//! - **Typed Collections**: serde types encoded as JSON or BSON
//! - **Transactions**: explicit handles with at most one live per provider
//! - **Streaming Scans**: cursors that release their connection when dropped
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docsql-persistence = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `postgres` - PostgreSQL via a deadpool connection pool
//!
//! # Architecture
//!
//! - [`types`] - Storage formats, registry entries and records
//! - [`error`] - Error types for all operations
//! - [`core`] - Storage traits, transactions and cursors
//! - [`codec`] - JSON/BSON encoding of serde values
//! - [`registry`] - Collection name rules and identifier quoting
//! - [`collection`] - Typed and raw views over one collection
//! - [`store`] - The application-facing [`DocumentStore`]
//! - [`factory`] - Provider lookup by name
//! - [`backends`] - Backend implementations (SQLite, PostgreSQL)
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> docsql_persistence::StorageResult<()> {
//! use docsql_persistence::{DocumentStore, StoreConfig, StorageFormat};
//!
//! let store = DocumentStore::connect(&StoreConfig::new("sqlite", "./data/docs.db")).await?;
//! let widgets = store
//!     .create_collection_with_format::<serde_json::Value>("Widgets", StorageFormat::Json)
//!     .await?;
//!
//! let id = widgets.insert(&serde_json::json!({"name": "x"})).await?;
//! assert!(widgets.get(id).await?.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Transactions
//!
//! A transaction handle implements the same [`RecordStore`] contract as its
//! provider, so collection views built on it run inside the transaction:
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example(store: docsql_persistence::DocumentStore) -> docsql_persistence::StorageResult<()> {
//! use docsql_persistence::{DocumentCollection, IsolationLevel};
//!
//! let tx = store.begin_transaction(IsolationLevel::default()).await?;
//! if let Some(widgets) = DocumentCollection::<_, serde_json::Value>::open(&*tx, "Widgets").await? {
//!     widgets.insert(&serde_json::json!({"name": "y"})).await?;
//! }
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod codec;
pub mod collection;
pub mod core;
pub mod error;
pub mod factory;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use collection::{DocumentCollection, DocumentCursor, RawCollection};
pub use error::{StorageError, StorageResult};
pub use factory::ProviderRegistry;
pub use store::{Document, DocumentStore, StoreConfig, StoreSettings};
pub use types::{CollectionInfo, Record, RecordData, StorageFormat};

// Re-export core traits
pub use crate::core::{
    BackendKind, DocumentProvider, IsolationLevel, RecordCursor, RecordStore, Transaction,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
