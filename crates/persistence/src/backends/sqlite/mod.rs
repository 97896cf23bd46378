//! SQLite backend implementation.
//!
//! Supports both in-memory databases (great for testing) and file-based
//! databases. File databases run in WAL mode so readers outside a
//! transaction keep seeing the last committed state while it is open.
//!
//! # Example
//!
//! ```no_run
//! use docsql_persistence::backends::sqlite::SqliteProvider;
//! use docsql_persistence::core::RecordStore;
//! use docsql_persistence::types::StorageFormat;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SqliteProvider::open("./data/docs.db")?;
//! provider.create_collection("Widgets", StorageFormat::Json).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Collection registry
//! CREATE TABLE "_collections" (
//!     "Name" TEXT PRIMARY KEY NOT NULL COLLATE NOCASE,
//!     "Format" TEXT NOT NULL          -- 'JSON' or 'BSON'
//! );
//!
//! -- One table per collection
//! CREATE TABLE "Widgets" (
//!     "Id" TEXT PRIMARY KEY NOT NULL,  -- hyphenated lowercase UUID
//!     "Data" TEXT NOT NULL CHECK (typeof("Data") = 'text')  -- BLOB for BSON
//! );
//! ```

mod backend;
mod schema;
mod storage;
mod transaction;

pub use backend::{SqliteProvider, SqliteProviderConfig};
pub use transaction::SqliteTransaction;
