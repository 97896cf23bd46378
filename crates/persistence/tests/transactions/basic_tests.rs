//! Tests for basic transaction operations.
//!
//! These run against file databases: in-memory databases read uncommitted
//! data across connections, which would hide the isolation under test.

use std::sync::Arc;

use uuid::Uuid;

use docsql_persistence::core::TransactionState;
use docsql_persistence::error::{StorageError, TransactionError};
use docsql_persistence::{
    DocumentCollection, DocumentProvider, DocumentStore, IsolationLevel, Record, RecordData,
    RecordStore, StorageFormat, Transaction,
};

use crate::common::{Widget, file_db, widget};

fn json_record(body: &str) -> Record {
    Record::new(Uuid::new_v4(), RecordData::Json(body.to_string()))
}

// ============================================================================
// Handle Guard Tests
// ============================================================================

#[tokio::test]
async fn test_second_begin_is_rejected() {
    let db = file_db();
    let provider = &db.provider;

    let first = provider
        .begin_transaction(IsolationLevel::default())
        .await
        .unwrap();
    assert!(provider.has_active_transaction());

    let err = provider
        .begin_transaction(IsolationLevel::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Transaction(TransactionError::AlreadyActive)
    ));

    first.rollback().await.unwrap();
    assert!(!provider.has_active_transaction());

    let second = provider
        .begin_transaction(IsolationLevel::default())
        .await
        .unwrap();
    second.commit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_begin_has_one_winner() {
    let db = file_db();
    let provider: Arc<dyn DocumentProvider> = Arc::new(db.reopen());

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                provider
                    .begin_transaction(IsolationLevel::ReadCommitted)
                    .await
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(tx) => winners.push(tx),
            Err(StorageError::Transaction(TransactionError::AlreadyActive)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn test_handle_reports_isolation_and_state() {
    let db = file_db();
    let tx = db.provider.begin(IsolationLevel::Serializable).unwrap();
    assert_eq!(tx.isolation_level(), IsolationLevel::Serializable);
    assert_eq!(tx.state(), TransactionState::Active);
    assert!(tx.is_active());
    tx.commit().unwrap();
}

// ============================================================================
// Commit Tests
// ============================================================================

#[tokio::test]
async fn test_commit_publishes_writes() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Widgets", StorageFormat::Json)
        .await
        .unwrap();

    let tx = provider.begin(IsolationLevel::ReadCommitted).unwrap();
    let record = json_record(r#"{"name":"t"}"#);
    tx.add_or_update_record(&record, "Widgets").await.unwrap();

    // Visible on the handle, not yet outside it.
    assert!(tx.get_record(record.id, "Widgets").await.unwrap().is_some());
    assert!(provider.get_record(record.id, "Widgets").await.unwrap().is_none());

    tx.commit().unwrap();
    assert!(!provider.has_active_transaction());
    assert_eq!(
        provider.get_record(record.id, "Widgets").await.unwrap(),
        Some(record)
    );
}

#[tokio::test]
async fn test_create_collection_joins_transaction() {
    let db = file_db();
    let provider = &db.provider;

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    tx.create_collection("Fresh", StorageFormat::Bson)
        .await
        .unwrap();
    assert!(tx.collection_exists("Fresh").await.unwrap());
    assert!(!provider.collection_exists("Fresh").await.unwrap());

    tx.commit().unwrap();
    let info = provider.collection_info("Fresh").await.unwrap().unwrap();
    assert_eq!(info.format, StorageFormat::Bson);
}

#[tokio::test]
async fn test_delete_collection_joins_transaction() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Doomed", StorageFormat::Json)
        .await
        .unwrap();

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    assert!(tx.delete_collection("Doomed").await.unwrap());
    assert!(!tx.delete_collection("Doomed").await.unwrap());
    assert!(provider.collection_exists("Doomed").await.unwrap());

    tx.commit().unwrap();
    assert!(!provider.collection_exists("Doomed").await.unwrap());
}

#[tokio::test]
async fn test_provider_ddl_rejected_while_handle_live() {
    let db = file_db();
    let provider = &db.provider;
    provider
        .create_collection("Held", StorageFormat::Json)
        .await
        .unwrap();

    let tx = provider.begin(IsolationLevel::default()).unwrap();
    let started = std::time::Instant::now();
    assert!(matches!(
        provider
            .create_collection("Outside", StorageFormat::Json)
            .await
            .unwrap_err(),
        StorageError::Transaction(TransactionError::AlreadyActive)
    ));
    assert!(matches!(
        provider.delete_collection("Held").await.unwrap_err(),
        StorageError::Transaction(TransactionError::AlreadyActive)
    ));
    // Refused up front rather than after the busy timeout.
    assert!(started.elapsed() < std::time::Duration::from_secs(1));

    tx.rollback().unwrap();
    assert!(!provider.collection_exists("Outside").await.unwrap());
    provider
        .create_collection("Outside", StorageFormat::Json)
        .await
        .unwrap();
    assert!(provider.delete_collection("Held").await.unwrap());
}

#[tokio::test]
async fn test_typed_view_inside_transaction() {
    let db = file_db();
    db.provider
        .create_collection("Widgets", StorageFormat::Bson)
        .await
        .unwrap();

    let tx = db.provider.begin(IsolationLevel::default()).unwrap();
    let widgets = DocumentCollection::<_, Widget>::open_typed(&tx)
        .await
        .unwrap()
        .unwrap();
    let id = widgets.insert(&widget("tx", "gold", 1)).await.unwrap();
    assert_eq!(
        widgets.find(|w| w.color == "gold").await.unwrap(),
        Some(widget("tx", "gold", 1))
    );
    tx.commit().unwrap();

    let widgets = DocumentCollection::<_, Widget>::open_typed(&db.provider)
        .await
        .unwrap()
        .unwrap();
    assert!(widgets.get(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_store_transaction_through_trait_object() {
    let db = file_db();
    let store = DocumentStore::new(Arc::new(db.reopen()));
    store
        .create_collection::<Widget>("Widgets")
        .await
        .unwrap();

    let tx = store
        .begin_transaction(IsolationLevel::RepeatableRead)
        .await
        .unwrap();
    let widgets = DocumentCollection::<_, Widget>::open(&*tx, "Widgets")
        .await
        .unwrap()
        .unwrap();
    widgets.insert(&widget("boxed", "white", 2)).await.unwrap();
    tx.commit().await.unwrap();

    let widgets = store.typed_collection::<Widget>().await.unwrap().unwrap();
    assert_eq!(widgets.all().await.unwrap().len(), 1);
    assert!(!store.provider().has_active_transaction());
}
