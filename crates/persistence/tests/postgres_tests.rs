//! PostgreSQL backend integration tests.
//!
//! These tests verify the PostgreSQL backend implementation.
//! Tests that require a running PostgreSQL instance use testcontainers
//! to spin up real PostgreSQL instances in Docker.
//!
//! Run with: `cargo test -p docsql-persistence --features postgres -- postgres`

#![cfg(feature = "postgres")]

use docsql_persistence::backends::postgres::{PostgresConfig, PostgresSslMode};
use docsql_persistence::core::BackendKind;

// ============================================================================
// Provider Configuration Tests (no PostgreSQL instance required)
// ============================================================================

#[test]
fn test_postgres_config_defaults() {
    let config = PostgresConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 5432);
    assert_eq!(config.dbname, "docsql");
    assert_eq!(config.user, "docsql");
    assert!(config.password.is_none());
    assert_eq!(config.ssl_mode, PostgresSslMode::Prefer);
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.connect_timeout_secs, 5);
    assert_eq!(config.statement_timeout_ms, 30000);
}

#[test]
fn test_postgres_config_serialization() {
    let config = PostgresConfig {
        host: "pg-server".to_string(),
        port: 5433,
        dbname: "test_db".to_string(),
        user: "test_user".to_string(),
        password: Some("secret".to_string()),
        ssl_mode: PostgresSslMode::Require,
        ..Default::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"require\""));
    let deserialized: PostgresConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.host, "pg-server");
    assert_eq!(deserialized.port, 5433);
    assert_eq!(deserialized.dbname, "test_db");
    assert_eq!(deserialized.user, "test_user");
    assert_eq!(deserialized.password, Some("secret".to_string()));
    assert_eq!(deserialized.ssl_mode, PostgresSslMode::Require);
}

#[test]
fn test_postgres_connection_string() {
    let config =
        PostgresConfig::parse_connection_string("postgresql://reader:pw@10.0.0.5:5544/catalog")
            .unwrap();
    assert_eq!(config.host, "10.0.0.5");
    assert_eq!(config.port, 5544);
    assert_eq!(config.dbname, "catalog");
    assert_eq!(config.user, "reader");
    assert_eq!(config.password.as_deref(), Some("pw"));
}

#[test]
fn test_postgres_backend_kind() {
    let kind = BackendKind::Postgres;
    assert_eq!(format!("{}", kind), "postgres");
}

// ============================================================================
// Integration Tests (requires Docker for testcontainers)
// ============================================================================

/// Integration tests that require a real PostgreSQL instance via testcontainers.
///
/// They mirror the contract tests in sqlite_tests.rs. All tests share one
/// database, so every test works on collections with unique names.
///
/// Run with:
///   cargo test -p docsql-persistence --features postgres -- postgres_integration
///
/// Skip if no Docker:
///   cargo test -p docsql-persistence --features postgres -- --skip postgres_integration
#[cfg(test)]
mod postgres_integration {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use docsql_persistence::backends::postgres::{PostgresConfig, PostgresProvider};
    use docsql_persistence::error::{BackendError, CollectionError, StorageError, TransactionError};
    use docsql_persistence::{
        BackendKind, DocumentCollection, DocumentProvider, IsolationLevel, Record, RecordData,
        RecordStore, StorageFormat,
    };

    use testcontainers::ImageExt;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::postgres::Postgres;
    use tokio::sync::OnceCell;

    /// Shared PostgreSQL container reused across all tests in this module.
    struct SharedPg {
        host: String,
        port: u16,
        /// Kept alive for the duration of the test binary; dropped at process exit.
        _container: testcontainers::ContainerAsync<Postgres>,
    }

    static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

    async fn shared_pg() -> &'static SharedPg {
        SHARED_PG
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = Postgres::default()
                    .with_label("github.run_id", &run_id)
                    .start()
                    .await
                    .expect("Failed to start PostgreSQL container");

                let port = container
                    .get_host_port_ipv4(5432)
                    .await
                    .expect("Failed to get host port");

                let host = container
                    .get_host()
                    .await
                    .expect("Failed to get host")
                    .to_string();

                SharedPg {
                    host,
                    port,
                    _container: container,
                }
            })
            .await
    }

    fn config_for(pg: &SharedPg) -> PostgresConfig {
        PostgresConfig {
            host: pg.host.clone(),
            port: pg.port,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: Some("postgres".to_string()),
            max_connections: 5,
            ssl_mode: docsql_persistence::backends::postgres::PostgresSslMode::Disable,
            ..Default::default()
        }
    }

    /// Creates a provider connected to the shared PostgreSQL instance.
    ///
    /// The registry is created on first use; `init_schema()` is idempotent.
    async fn create_provider() -> PostgresProvider {
        let pg = shared_pg().await;
        PostgresProvider::new(config_for(pg))
            .await
            .expect("Failed to create PostgresProvider")
    }

    /// A plain client outside any provider, for changing tables behind its back.
    async fn raw_client() -> tokio_postgres::Client {
        let pg = shared_pg().await;
        let url = format!(
            "host={} port={} user=postgres password=postgres dbname=postgres",
            pg.host, pg.port
        );
        let (client, connection) = tokio_postgres::connect(&url, tokio_postgres::NoTls)
            .await
            .unwrap();
        tokio::spawn(connection);
        client
    }

    /// A collection name no other test uses.
    fn unique(name: &str) -> String {
        format!("{}_{}", name, Uuid::new_v4().simple())
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
        size: i64,
    }

    fn widget(name: &str, size: i64) -> Widget {
        Widget {
            name: name.to_string(),
            size,
        }
    }

    // ========================================================================
    // Registry Tests
    // ========================================================================

    #[tokio::test]
    async fn postgres_integration_create_delete_symmetry() {
        let provider = create_provider().await;
        let name = unique("Widgets");

        assert!(!provider.collection_exists(&name).await.unwrap());
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();
        assert!(provider.collection_exists(&name).await.unwrap());

        let err = provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Collection(CollectionError::AlreadyExists { .. })
        ));

        assert!(provider.delete_collection(&name).await.unwrap());
        assert!(!provider.delete_collection(&name).await.unwrap());
        assert!(!provider.collection_exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn postgres_integration_reserved_name() {
        let provider = create_provider().await;
        let err = provider
            .create_collection("_Collections", StorageFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Collection(CollectionError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn postgres_integration_failed_create_is_atomic() {
        let provider = create_provider().await;
        let name = unique("Ghosts");

        let client = raw_client().await;
        client
            .batch_execute(&format!("CREATE TABLE \"{}\" (x INTEGER)", name))
            .await
            .unwrap();

        let err = provider
            .create_collection(&name, StorageFormat::Bson)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(BackendError::Internal { .. })));
        assert!(!provider.collection_exists(&name).await.unwrap());
    }

    // ========================================================================
    // Record Tests
    // ========================================================================

    #[tokio::test]
    async fn postgres_integration_upsert_roundtrip() {
        let provider = create_provider().await;
        let name = unique("Records");
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();

        let id = Uuid::new_v4();
        let first = Record::new(id, RecordData::Json(r#"{"v":1}"#.to_string()));
        let second = Record::new(id, RecordData::Json(r#"{"v":2}"#.to_string()));
        provider.add_or_update_record(&first, &name).await.unwrap();
        provider.add_or_update_record(&second, &name).await.unwrap();

        assert_eq!(provider.get_record(id, &name).await.unwrap(), Some(second));
        let all = provider
            .enumerate_collection(&name)
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        assert!(provider.remove_record(id, &name).await.unwrap());
        assert!(provider.get_record(id, &name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn postgres_integration_widgets_scenario() {
        let provider = create_provider().await;
        let name = unique("Widgets");
        provider
            .create_collection(&name, StorageFormat::Bson)
            .await
            .unwrap();

        let widgets = DocumentCollection::<_, Widget>::open(&provider, &name)
            .await
            .unwrap()
            .unwrap();
        let a = Uuid::new_v4();
        widgets.add_or_update(a, &widget("x", 1)).await.unwrap();
        widgets.insert(&widget("y", 2)).await.unwrap();

        assert_eq!(
            widgets.filter(|w| w.name == "x").await.unwrap(),
            vec![widget("x", 1)]
        );
        assert!(widgets.remove(a).await.unwrap());
        assert!(widgets.get(a).await.unwrap().is_none());

        assert!(provider.delete_collection(&name).await.unwrap());
        assert!(!provider.collection_exists(&name).await.unwrap());
    }

    // ========================================================================
    // Transaction Tests
    // ========================================================================

    #[tokio::test]
    async fn postgres_integration_transaction_guard() {
        let provider = create_provider().await;
        let tx = provider
            .begin_transaction(IsolationLevel::Serializable)
            .await
            .unwrap();
        let err = provider
            .begin_transaction(IsolationLevel::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Transaction(TransactionError::AlreadyActive)
        ));
        tx.rollback().await.unwrap();
        assert!(!provider.has_active_transaction());
    }

    #[tokio::test]
    async fn postgres_integration_rollback_and_commit() {
        let provider = create_provider().await;
        let name = unique("Tx");
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();

        let discarded = Record::new(Uuid::new_v4(), RecordData::Json("{}".to_string()));
        let tx = provider.begin(IsolationLevel::default()).await.unwrap();
        tx.add_or_update_record(&discarded, &name).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(provider.get_record(discarded.id, &name).await.unwrap().is_none());

        let kept = Record::new(Uuid::new_v4(), RecordData::Json("{}".to_string()));
        let other = unique("TxDdl");
        let tx = provider.begin(IsolationLevel::RepeatableRead).await.unwrap();
        tx.create_collection(&other, StorageFormat::Bson)
            .await
            .unwrap();
        tx.add_or_update_record(&kept, &name).await.unwrap();
        assert!(!provider.collection_exists(&other).await.unwrap());
        tx.commit().await.unwrap();

        assert!(provider.get_record(kept.id, &name).await.unwrap().is_some());
        assert!(provider.collection_exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn postgres_integration_failed_ddl_keeps_transaction() {
        let provider = create_provider().await;
        let name = unique("Keep");
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();

        let tx = provider.begin(IsolationLevel::default()).await.unwrap();
        let record = Record::new(Uuid::new_v4(), RecordData::Json("{}".to_string()));
        tx.add_or_update_record(&record, &name).await.unwrap();

        // The registry already lists it, so this fails before any DDL runs.
        let err = tx
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Collection(CollectionError::AlreadyExists { .. })
        ));

        tx.commit().await.unwrap();
        assert!(provider.get_record(record.id, &name).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn postgres_integration_failed_statement_rolls_back_commit() {
        let provider = create_provider().await;
        let name = unique("Vanishing");
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();

        let tx = provider.begin(IsolationLevel::default()).await.unwrap();
        raw_client()
            .await
            .batch_execute(&format!("DROP TABLE \"{}\"", name))
            .await
            .unwrap();

        let record = Record::new(Uuid::new_v4(), RecordData::Json("{}".to_string()));
        let err = tx.add_or_update_record(&record, &name).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(BackendError::Internal { .. })));

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Transaction(TransactionError::RolledBack { .. })
        ));
        assert!(!provider.has_active_transaction());
    }

    #[tokio::test]
    async fn postgres_integration_provider_ddl_rejected_during_transaction() {
        let provider = create_provider().await;
        let existing = unique("Held");
        provider
            .create_collection(&existing, StorageFormat::Json)
            .await
            .unwrap();

        let tx = provider.begin(IsolationLevel::default()).await.unwrap();
        let fresh = unique("Outside");
        assert!(matches!(
            provider
                .create_collection(&fresh, StorageFormat::Json)
                .await
                .unwrap_err(),
            StorageError::Transaction(TransactionError::AlreadyActive)
        ));
        assert!(matches!(
            provider.delete_collection(&existing).await.unwrap_err(),
            StorageError::Transaction(TransactionError::AlreadyActive)
        ));
        tx.rollback().await.unwrap();

        assert!(!provider.collection_exists(&fresh).await.unwrap());
        assert!(provider.collection_exists(&existing).await.unwrap());
        assert!(provider.delete_collection(&existing).await.unwrap());
    }

    #[tokio::test]
    async fn postgres_integration_dropped_handle_releases_slot() {
        let provider = create_provider().await;
        {
            let _tx = provider.begin(IsolationLevel::default()).await.unwrap();
            assert!(provider.has_active_transaction());
        }
        assert!(!provider.has_active_transaction());
        provider.health_check().await.unwrap();
        assert_eq!(provider.kind(), BackendKind::Postgres);
    }

    #[tokio::test]
    async fn postgres_integration_cursor_busy() {
        let provider = create_provider().await;
        let name = unique("Cursor");
        provider
            .create_collection(&name, StorageFormat::Json)
            .await
            .unwrap();

        let tx = provider.begin(IsolationLevel::default()).await.unwrap();
        for n in 0..3 {
            let record = Record::new(Uuid::new_v4(), RecordData::Json(format!("{{\"n\":{n}}}")));
            tx.add_or_update_record(&record, &name).await.unwrap();
        }

        let mut cursor = tx.enumerate_collection(&name).await.unwrap();
        assert!(cursor.next().await.unwrap().is_some());
        assert!(matches!(
            tx.collection_infos().await.unwrap_err(),
            StorageError::Transaction(TransactionError::ConnectionBusy)
        ));
        cursor.close().await.unwrap();

        assert!(!tx.collection_infos().await.unwrap().is_empty());
        tx.commit().await.unwrap();
    }
}
