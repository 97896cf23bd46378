//! Transaction traits and bookkeeping.
//!
//! A provider allows one live transaction handle at a time. The handle owns
//! its connection; record operations on the handle join its transaction.
//! Committing or rolling back consumes the handle, and dropping a handle that
//! is still active rolls the transaction back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageResult, TransactionError};

use super::storage::RecordStore;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// May observe uncommitted changes of other transactions.
    ReadUncommitted,
    /// Read committed - sees only committed data.
    #[default]
    ReadCommitted,
    /// Repeatable read - consistent reads within transaction.
    RepeatableRead,
    /// Serializable - full isolation (may reduce concurrency).
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL keyword form, as used in `SET TRANSACTION`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "read-uncommitted"),
            IsolationLevel::ReadCommitted => write!(f, "read-committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable-read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// Lifecycle state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open; operations join the transaction.
    Active,
    /// Committed successfully.
    Committed,
    /// Rolled back, explicitly or after a failed commit.
    RolledBack,
}

/// Tracks whether a provider currently has a live transaction handle.
///
/// Claiming the slot is a single compare-and-swap, so two concurrent
/// `begin_transaction` calls cannot both succeed.
#[derive(Debug, Clone, Default)]
pub struct TransactionSlot {
    claimed: Arc<AtomicBool>,
}

impl TransactionSlot {
    /// Creates an unclaimed slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for a new transaction.
    ///
    /// The slot stays claimed until the returned guard is dropped.
    pub fn claim(&self) -> Result<TransactionGuard, TransactionError> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TransactionError::AlreadyActive)?;
        Ok(TransactionGuard {
            claimed: Arc::clone(&self.claimed),
        })
    }

    /// Returns true while a guard is alive.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Fails with `AlreadyActive` while a guard is alive.
    pub fn ensure_unclaimed(&self) -> Result<(), TransactionError> {
        if self.is_claimed() {
            return Err(TransactionError::AlreadyActive);
        }
        Ok(())
    }
}

/// Releases its [`TransactionSlot`] when dropped.
#[derive(Debug)]
pub struct TransactionGuard {
    claimed: Arc<AtomicBool>,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// A live transaction handle.
///
/// Record and collection operations on the handle run on the handle's
/// connection inside its transaction. Collection DDL issued through a handle
/// is scoped by a savepoint, so a failed create or delete leaves the rest of
/// the transaction intact.
///
/// # Example
///
/// ```ignore
/// use docsql_persistence::core::{DocumentProvider, IsolationLevel, RecordStore, Transaction};
///
/// async fn example(provider: &dyn DocumentProvider) -> docsql_persistence::StorageResult<()> {
///     let tx = provider.begin_transaction(IsolationLevel::default()).await?;
///     tx.create_collection("Widgets", Default::default()).await?;
///     tx.commit().await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Transaction: RecordStore + std::fmt::Debug {
    /// Returns the isolation level requested when the transaction began.
    fn isolation_level(&self) -> IsolationLevel;

    /// Returns the handle's lifecycle state.
    fn state(&self) -> TransactionState;

    /// Returns true while the transaction is open.
    fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Commits the transaction.
    ///
    /// If the commit fails, the transaction is rolled back and
    /// `TransactionError::RolledBack` is returned. Either way the handle is
    /// released and the provider may begin a new transaction.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls back the transaction and releases the handle.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
