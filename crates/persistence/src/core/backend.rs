//! Provider abstraction over database drivers.
//!
//! This module defines [`DocumentProvider`], the entry point a backend
//! exposes: autocommit record storage plus transaction management.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::StorageResult;

use super::storage::RecordStore;
use super::transaction::{IsolationLevel, Transaction};

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// PostgreSQL database.
    Postgres,
    /// Custom or unknown backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A database connection factory that stores document collections.
///
/// A provider owns a connection pool. Each autocommit call borrows a
/// connection for its own duration. At most one transaction handle is live
/// per provider at any time; the handle owns its connection exclusively
/// until it commits, rolls back, or is dropped.
#[async_trait]
pub trait DocumentProvider: RecordStore + Debug {
    /// Returns the backend type.
    fn kind(&self) -> BackendKind;

    /// Starts a transaction on a fresh connection.
    ///
    /// # Errors
    ///
    /// * `TransactionError::AlreadyActive` if a handle from this provider is
    ///   still live
    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> StorageResult<Box<dyn Transaction>>;

    /// Returns true while a transaction handle from this provider is live.
    fn has_active_transaction(&self) -> bool;

    /// Checks that the database is reachable.
    async fn health_check(&self) -> StorageResult<()>;
}
