//! Core storage traits and abstractions.
//!
//! This module provides the foundational traits for the persistence layer:
//!
//! - [`RecordStore`] - Collection and record operations
//! - [`DocumentProvider`] - A backend entry point: autocommit storage plus transactions
//! - [`Transaction`] - A live transaction handle, itself a [`RecordStore`]
//! - [`RecordCursor`] - Lazy enumeration of a collection
//!
//! # Trait Hierarchy
//!
//! ```text
//! RecordStore
//!     ├── DocumentProvider   (autocommit; begins transactions)
//!     └── Transaction        (operations join the open transaction)
//! ```
//!
//! Because both providers and transaction handles implement [`RecordStore`],
//! the typed collection views in [`crate::collection`] work the same way
//! inside and outside a transaction.

mod backend;
mod cursor;
mod storage;
mod transaction;

pub use backend::{BackendKind, DocumentProvider};
pub use cursor::RecordCursor;
pub use storage::RecordStore;
pub use transaction::{
    IsolationLevel, Transaction, TransactionGuard, TransactionSlot, TransactionState,
};
