//! Tests for transaction rollback scenarios.
//!
//! Covers explicit rollback, rollback on drop, failed statements inside a
//! transaction and cursors that outlive their handle.

use uuid::Uuid;

use docsql_persistence::error::{BackendError, CollectionError, StorageError, TransactionError};
use docsql_persistence::{
    DocumentProvider, IsolationLevel, Record, RecordData, RecordStore, StorageFormat,
};

use crate::common::file_db;

fn json_record(body: &str) -> Record {
    Record::new(Uuid::new_v4(), RecordData::Json(body.to_string()))
}

async fn snapshot<S: RecordStore + ?Sized>(store: &S, collection: &str) -> Vec<Record> {
    let mut records = store
        .enumerate_collection(collection)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    records.sort_by_key(|r| r.id);
    records
}

// ============================================================================
// Explicit Rollback Tests
// ============================================================================

#[tokio::test]
async fn test_rollback_restores_collection() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();
    let existing = json_record(r#"{"v":1}"#);
    provider
        .add_or_update_record(&existing, "Widgets")
        .await
        .unwrap();
    let before = snapshot(provider, "Widgets").await;

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    let changed = Record::new(existing.id, RecordData::Json(r#"{"v":2}"#.to_string()));
    tx.add_or_update_record(&changed, "Widgets").await.unwrap();
    tx.add_or_update_record(&json_record(r#"{"v":3}"#), "Widgets")
        .await
        .unwrap();
    assert_eq!(snapshot(&tx, "Widgets").await.len(), 2);
    tx.rollback().unwrap();

    assert_eq!(snapshot(provider, "Widgets").await, before);
    assert!(!provider.has_active_transaction());
}

#[tokio::test]
async fn test_rollback_undoes_collection_ddl() {
    let db = file_db();
    let provider = &db.provider;

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    tx.create_collection("Temporary", StorageFormat::Json)
        .await
        .unwrap();
    tx.add_or_update_record(&json_record("{}"), "Temporary")
        .await
        .unwrap();
    tx.rollback().unwrap();

    assert!(!provider.collection_exists("Temporary").await.unwrap());
    let conn = db.raw_connection();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'Temporary'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

// ============================================================================
// Drop Tests
// ============================================================================

#[tokio::test]
async fn test_dropped_handle_rolls_back() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();

    let record = json_record(r#"{"lost":true}"#);
    {
        let tx = provider
            .begin_transaction(IsolationLevel::default())
            .await
            .unwrap();
        tx.add_or_update_record(&record, "Widgets").await.unwrap();
        assert!(provider.has_active_transaction());
    }

    assert!(!provider.has_active_transaction());
    assert!(provider.get_record(record.id, "Widgets").await.unwrap().is_none());

    // The provider accepts a new transaction right away.
    let tx = provider.begin(IsolationLevel::default()).unwrap();
    tx.commit().unwrap();
}

// ============================================================================
// Failure Inside a Transaction
// ============================================================================

#[tokio::test]
async fn test_failed_ddl_keeps_transaction_usable() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();
    db.raw_connection()
        .execute_batch("CREATE TABLE \"Ghosts\" (x INTEGER)")
        .unwrap();

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    let first = json_record(r#"{"n":1}"#);
    tx.add_or_update_record(&first, "Widgets").await.unwrap();

    let err = tx
        .create_collection("Ghosts", StorageFormat::Json)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend(BackendError::Internal { .. })));

    let err = tx
        .create_collection("_collections", StorageFormat::Json)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Collection(CollectionError::InvalidName { .. })
    ));

    let second = json_record(r#"{"n":2}"#);
    tx.add_or_update_record(&second, "Widgets").await.unwrap();
    tx.commit().unwrap();

    assert!(provider.get_record(first.id, "Widgets").await.unwrap().is_some());
    assert!(provider.get_record(second.id, "Widgets").await.unwrap().is_some());
    assert!(!provider.collection_exists("Ghosts").await.unwrap());
}

// ============================================================================
// Cursor Interaction Tests
// ============================================================================

#[tokio::test]
async fn test_open_cursor_makes_handle_busy() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    let records: Vec<Record> = (0..3).map(|n| json_record(&format!("{{\"n\":{n}}}"))).collect();
    for record in &records {
        tx.add_or_update_record(record, "Widgets").await.unwrap();
    }

    let mut cursor = tx.enumerate_collection("Widgets").await.unwrap();
    assert!(cursor.next().await.unwrap().is_some());

    let err = tx.get_record(records[0].id, "Widgets").await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Transaction(TransactionError::ConnectionBusy)
    ));
    assert!(matches!(
        tx.enumerate_collection("Widgets").await.unwrap_err(),
        StorageError::Transaction(TransactionError::ConnectionBusy)
    ));

    cursor.close().await.unwrap();
    assert!(tx.get_record(records[0].id, "Widgets").await.unwrap().is_some());
    tx.commit().unwrap();

    assert_eq!(snapshot(provider, "Widgets").await.len(), 3);
}

#[tokio::test]
async fn test_commit_with_open_cursor_rolls_back_after_cursor() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    let record = json_record(r#"{"pending":true}"#);
    tx.add_or_update_record(&record, "Widgets").await.unwrap();

    let cursor = tx.enumerate_collection("Widgets").await.unwrap();
    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        StorageError::Transaction(TransactionError::ConnectionBusy)
    ));

    // The cursor still owns the connection, and with it the slot.
    assert!(provider.has_active_transaction());
    cursor.close().await.unwrap();

    assert!(!provider.has_active_transaction());
    assert!(provider.get_record(record.id, "Widgets").await.unwrap().is_none());
}
