//! Transaction support for SQLite backend.

use std::sync::Arc;

use async_trait::async_trait;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    IsolationLevel, RecordCursor, RecordStore, Transaction, TransactionGuard, TransactionState,
};
use crate::error::{StorageError, StorageResult, TransactionError};
use crate::registry;
use crate::types::{CollectionInfo, Record, StorageFormat};

use super::storage;

/// The connection a transaction runs on.
///
/// Shared between the handle and any cursor it opened. Whoever drops the
/// last reference while the transaction is still open rolls it back, and
/// only then is the provider's transaction slot released.
struct TransactionConnection {
    conn: PooledConnection<SqliteConnectionManager>,
    open: bool,
    _slot: TransactionGuard,
}

impl TransactionConnection {
    fn finish(&mut self, statement: &str) -> rusqlite::Result<()> {
        self.open = false;
        self.conn.execute_batch(statement)
    }
}

impl Drop for TransactionConnection {
    fn drop(&mut self) {
        if self.open {
            warn!("SQLite transaction dropped without commit or rollback; rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Rollback of abandoned SQLite transaction failed");
            }
        }
    }
}

/// A SQLite transaction.
pub struct SqliteTransaction {
    /// The connection used for this transaction.
    conn: Arc<Mutex<TransactionConnection>>,
    isolation: IsolationLevel,
    state: TransactionState,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish()
    }
}

impl SqliteTransaction {
    /// Starts a transaction on `conn`.
    pub(super) fn begin(
        conn: PooledConnection<SqliteConnectionManager>,
        isolation: IsolationLevel,
        slot: TransactionGuard,
    ) -> StorageResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE").map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("Failed to begin transaction: {}", e),
            })
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(TransactionConnection {
                conn,
                open: true,
                _slot: slot,
            })),
            isolation,
            state: TransactionState::Active,
        })
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.state != TransactionState::Active {
            return Err(StorageError::Transaction(TransactionError::InvalidTransaction));
        }
        Ok(())
    }

    /// Locks the connection, failing fast if a cursor is reading from it.
    fn lock(&self) -> StorageResult<MutexGuard<'_, TransactionConnection>> {
        self.ensure_active()?;
        self.conn
            .try_lock()
            .map_err(|_| StorageError::Transaction(TransactionError::ConnectionBusy))
    }

    /// Like [`lock`](Self::lock), but the guard can move to another thread.
    fn lock_owned(&self) -> StorageResult<OwnedMutexGuard<TransactionConnection>> {
        self.ensure_active()?;
        Arc::clone(&self.conn)
            .try_lock_owned()
            .map_err(|_| StorageError::Transaction(TransactionError::ConnectionBusy))
    }

    /// Commits the transaction.
    ///
    /// A failed commit is rolled back and reported as `RolledBack`.
    pub fn commit(mut self) -> StorageResult<()> {
        let mut conn = self.lock()?;
        match conn.finish("COMMIT") {
            Ok(()) => {
                drop(conn);
                self.state = TransactionState::Committed;
                debug!("Committed SQLite transaction");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "SQLite commit failed; rolling back");
                // A failed COMMIT can leave the transaction open.
                let _ = conn.conn.execute_batch("ROLLBACK");
                drop(conn);
                self.state = TransactionState::RolledBack;
                Err(StorageError::Transaction(TransactionError::RolledBack {
                    reason: e.to_string(),
                }))
            }
        }
    }

    /// Rolls back the transaction.
    pub fn rollback(mut self) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let result = conn.finish("ROLLBACK");
        drop(conn);
        self.state = TransactionState::RolledBack;
        result?;
        debug!("Rolled back SQLite transaction");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteTransaction {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        Ok(storage::collection_info(&conn.conn, name)?.is_some())
    }

    async fn collection_info(&self, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let conn = self.lock()?;
        storage::collection_info(&conn.conn, name)
    }

    async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>> {
        let conn = self.lock()?;
        storage::collection_infos(&conn.conn)
    }

    async fn create_collection(&self, name: &str, format: StorageFormat) -> StorageResult<()> {
        registry::validate_collection_name(name)?;

        let mut conn = self.lock()?;
        let savepoint = conn.conn.savepoint()?;
        storage::create_collection(&savepoint, name, format)?;
        savepoint.commit()?;

        info!(collection = %name, format = %format, "Created collection in transaction");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StorageResult<bool> {
        let mut conn = self.lock()?;
        let savepoint = conn.conn.savepoint()?;
        let deleted = storage::delete_collection(&savepoint, name)?;
        savepoint.commit()?;

        if deleted {
            info!(collection = %name, "Deleted collection in transaction");
        }
        Ok(deleted)
    }

    async fn get_record(&self, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
        let conn = self.lock()?;
        storage::get_record(&conn.conn, id, collection)
    }

    async fn enumerate_collection(&self, collection: &str) -> StorageResult<RecordCursor> {
        // The cursor keeps the connection locked until it finishes.
        let conn = self.lock_owned()?;
        storage::require_collection(&conn.conn, collection)?;

        let (sender, receiver) = mpsc::channel(1);
        let collection = collection.to_string();
        let producer = tokio::task::spawn_blocking(move || {
            storage::stream_records(&conn.conn, &collection, &sender);
            // Unlock before the cursor can observe the end.
            drop(conn);
            drop(sender);
        });
        Ok(RecordCursor::from_channel(receiver, producer))
    }

    async fn add_or_update_record(&self, record: &Record, collection: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        storage::upsert_record(&conn.conn, record, collection)
    }

    async fn remove_record(&self, id: Uuid, collection: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        storage::remove_record(&conn.conn, id, collection)
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        SqliteTransaction::commit(*self)
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        SqliteTransaction::rollback(*self)
    }
}
