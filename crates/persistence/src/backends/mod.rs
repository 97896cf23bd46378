//! Database backend implementations.
//!
//! Each backend implements [`DocumentProvider`](crate::core::DocumentProvider)
//! and is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | SQLite | `sqlite` | Embedded database, in-memory or file based |
//! | PostgreSQL | `postgres` | Server RDBMS with pooled connections |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use docsql_persistence::backends::sqlite::SqliteProvider;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite provider
//! let provider = SqliteProvider::in_memory()?;
//!
//! // Or use a file-based database
//! let provider = SqliteProvider::open("./data/documents.db")?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
