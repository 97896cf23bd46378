//! Transaction support for PostgreSQL backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deadpool_postgres::{Client, Object};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    IsolationLevel, RecordCursor, RecordStore, Transaction, TransactionGuard, TransactionState,
};
use crate::error::{BackendError, StorageError, StorageResult, TransactionError};
use crate::registry;
use crate::types::{CollectionInfo, Record, StorageFormat};

use super::storage;

const DDL_SAVEPOINT: &str = "docsql_collection_ddl";

/// The connection a transaction runs on.
///
/// Shared between the handle and any cursor it opened. If the last
/// reference goes away while the transaction is open, the rollback is
/// handed to the runtime; without a runtime the connection is detached from
/// the pool and closed, which ends the transaction server-side.
struct TransactionConnection {
    client: Option<Client>,
    open: bool,
    /// Set once a statement failed; PostgreSQL then refuses everything but rollback.
    /// Shared with the row streams of cursors opened on this connection.
    aborted: Arc<AtomicBool>,
    _slot: TransactionGuard,
}

impl TransactionConnection {
    fn client(&self) -> StorageResult<&Client> {
        self.client
            .as_ref()
            .ok_or(StorageError::Transaction(TransactionError::InvalidTransaction))
    }

    /// Records whether `result` left the server-side transaction aborted.
    fn track<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        if aborts_transaction(&result) {
            self.aborted.store(true, Ordering::Release);
        }
        result
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    async fn finish(&mut self, statement: &str) -> StorageResult<()> {
        self.open = false;
        self.client()?.batch_execute(statement).await?;
        Ok(())
    }
}

impl Drop for TransactionConnection {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Some(client) = self.client.take() else {
            return;
        };
        warn!("PostgreSQL transaction dropped without commit or rollback; rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "Rollback of abandoned transaction failed; closing connection");
                        drop(Object::take(client));
                    }
                });
            }
            Err(_) => drop(Object::take(client)),
        }
    }
}

/// A PostgreSQL transaction.
///
/// Wraps a pooled client that has an active transaction.
pub struct PostgresTransaction {
    conn: Arc<Mutex<TransactionConnection>>,
    isolation: IsolationLevel,
    state: TransactionState,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction")
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .finish()
    }
}

impl PostgresTransaction {
    /// Starts a transaction on `client`.
    pub(super) async fn begin(
        client: Client,
        isolation: IsolationLevel,
        slot: TransactionGuard,
    ) -> StorageResult<Self> {
        client
            .batch_execute(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))
            .await
            .map_err(|e| {
                StorageError::Transaction(TransactionError::RolledBack {
                    reason: format!("Failed to begin transaction: {}", e),
                })
            })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(TransactionConnection {
                client: Some(client),
                open: true,
                aborted: Arc::new(AtomicBool::new(false)),
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

    fn lock_owned(&self) -> StorageResult<OwnedMutexGuard<TransactionConnection>> {
        self.ensure_active()?;
        Arc::clone(&self.conn)
            .try_lock_owned()
            .map_err(|_| StorageError::Transaction(TransactionError::ConnectionBusy))
    }

    /// Commits the transaction.
    ///
    /// If an earlier statement failed, or the commit itself fails, the
    /// transaction is rolled back and `RolledBack` is returned.
    pub async fn commit(mut self) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let outcome = if conn.is_aborted() {
            Err("an earlier statement in the transaction failed".to_string())
        } else {
            conn.finish("COMMIT").await.map_err(|e| e.to_string())
        };

        match outcome {
            Ok(()) => {
                drop(conn);
                self.state = TransactionState::Committed;
                debug!("Committed PostgreSQL transaction");
                Ok(())
            }
            Err(reason) => {
                warn!(reason = %reason, "PostgreSQL commit failed; rolling back");
                if let Err(e) = conn.finish("ROLLBACK").await {
                    warn!(error = %e, "Rollback after failed commit failed");
                }
                drop(conn);
                self.state = TransactionState::RolledBack;
                Err(StorageError::Transaction(TransactionError::RolledBack { reason }))
            }
        }
    }

    /// Rolls back the transaction.
    pub async fn rollback(mut self) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let result = conn.finish("ROLLBACK").await;
        drop(conn);
        self.state = TransactionState::RolledBack;
        result?;
        debug!("Rolled back PostgreSQL transaction");
        Ok(())
    }
}

/// Server errors leave the transaction aborted; library-side errors do not.
fn aborts_transaction<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::Backend(BackendError::Internal { .. })))
}

/// Sets `aborted` when a row of `rows` carries a server error.
fn watch_for_abort(
    rows: BoxStream<'static, StorageResult<Record>>,
    aborted: Arc<AtomicBool>,
) -> BoxStream<'static, StorageResult<Record>> {
    rows.inspect(move |row| {
        if aborts_transaction(row) {
            aborted.store(true, Ordering::Release);
        }
    })
    .boxed()
}

async fn begin_savepoint(client: &Client) -> StorageResult<()> {
    client
        .batch_execute(&format!("SAVEPOINT {}", DDL_SAVEPOINT))
        .await?;
    Ok(())
}

/// Releases the savepoint, or undoes everything since it if `outcome` failed.
///
/// The outer result reports the savepoint statements themselves; the inner
/// one is `outcome`, which no longer affects the enclosing transaction.
async fn end_savepoint<T>(
    client: &Client,
    outcome: StorageResult<T>,
) -> StorageResult<StorageResult<T>> {
    let statement = match outcome {
        Ok(_) => format!("RELEASE SAVEPOINT {}", DDL_SAVEPOINT),
        Err(_) => format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
            DDL_SAVEPOINT
        ),
    };
    client.batch_execute(&statement).await?;
    Ok(outcome)
}

async fn create_in_savepoint(
    conn: &TransactionConnection,
    name: &str,
    format: StorageFormat,
) -> StorageResult<StorageResult<()>> {
    let client = conn.client()?;
    begin_savepoint(client).await?;
    let outcome = storage::create_collection(client, name, format).await;
    end_savepoint(client, outcome).await
}

async fn delete_in_savepoint(
    conn: &TransactionConnection,
    name: &str,
) -> StorageResult<StorageResult<bool>> {
    let client = conn.client()?;
    begin_savepoint(client).await?;
    let outcome = storage::delete_collection(client, name).await;
    end_savepoint(client, outcome).await
}

async fn open_stream(
    conn: &TransactionConnection,
    collection: &str,
) -> StorageResult<BoxStream<'static, StorageResult<Record>>> {
    let client = conn.client()?;
    storage::require_collection(client, collection).await?;
    storage::stream_records(client, collection).await
}

#[async_trait]
impl RecordStore for PostgresTransaction {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.collection_info(name).await?.is_some())
    }

    async fn collection_info(&self, name: &str) -> StorageResult<Option<CollectionInfo>> {
        let conn = self.lock()?;
        let result = storage::collection_info(conn.client()?, name).await;
        conn.track(result)
    }

    async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>> {
        let conn = self.lock()?;
        let result = storage::collection_infos(conn.client()?).await;
        conn.track(result)
    }

    async fn create_collection(&self, name: &str, format: StorageFormat) -> StorageResult<()> {
        registry::validate_collection_name(name)?;

        let conn = self.lock()?;
        let result = create_in_savepoint(&conn, name, format).await;
        conn.track(result)??;

        info!(collection = %name, format = %format, "Created collection in transaction");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let result = delete_in_savepoint(&conn, name).await;
        let deleted = conn.track(result)??;

        if deleted {
            info!(collection = %name, "Deleted collection in transaction");
        }
        Ok(deleted)
    }

    async fn get_record(&self, id: Uuid, collection: &str) -> StorageResult<Option<Record>> {
        let conn = self.lock()?;
        let result = storage::get_record(conn.client()?, id, collection).await;
        conn.track(result)
    }

    async fn enumerate_collection(&self, collection: &str) -> StorageResult<RecordCursor> {
        // The cursor keeps the connection locked until it finishes.
        let conn = self.lock_owned()?;
        let result = open_stream(&conn, collection).await;
        let rows = watch_for_abort(conn.track(result)?, Arc::clone(&conn.aborted));
        Ok(RecordCursor::from_stream(rows, conn))
    }

    async fn add_or_update_record(&self, record: &Record, collection: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let result = storage::upsert_record(conn.client()?, record, collection).await;
        conn.track(result)
    }

    async fn remove_record(&self, id: Uuid, collection: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let result = storage::remove_record(conn.client()?, id, collection).await;
        conn.track(result)
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn state(&self) -> TransactionState {
        self.state
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        PostgresTransaction::commit(*self).await
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        PostgresTransaction::rollback(*self).await
    }
}
