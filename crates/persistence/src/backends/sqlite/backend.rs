//! SQLite provider implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::{
    BackendKind, DocumentProvider, IsolationLevel, Transaction, TransactionSlot,
};
use crate::error::{BackendError, StorageError, StorageResult};

use super::SqliteTransaction;
use super::schema;

/// Document provider backed by a SQLite database.
pub struct SqliteProvider {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteProviderConfig,
    is_memory: bool,
    /// Keeps a shared in-memory database alive while pooled connections come and go.
    _memory_anchor: Option<Mutex<Connection>>,
    transaction_slot: TransactionSlot,
}

impl Debug for SqliteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteProvider")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("transaction_active", &self.transaction_slot.is_claimed())
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteProviderConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteProviderConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
        }
    }
}

fn connection_failed(message: String) -> StorageError {
    StorageError::Backend(BackendError::ConnectionFailed {
        backend_name: "sqlite".to_string(),
        message,
    })
}

impl SqliteProvider {
    /// Creates a provider over a fresh in-memory database.
    ///
    /// All pooled connections share the one database, which lives as long
    /// as the provider. They read uncommitted data, so a scan never blocks a
    /// write, and reads made on the provider while a transaction handle is
    /// live can see that handle's pending writes.
    pub fn in_memory() -> StorageResult<Self> {
        Self::in_memory_with_config(SqliteProviderConfig::default())
    }

    /// Creates an in-memory provider with custom configuration.
    pub fn in_memory_with_config(config: SqliteProviderConfig) -> StorageResult<Self> {
        let uri = format!("file:docsql-{}?mode=memory&cache=shared", Uuid::new_v4());
        let anchor = Connection::open(&uri)
            .map_err(|e| connection_failed(format!("Failed to open in-memory database: {}", e)))?;
        Self::build(&uri, config, Some(anchor))
    }

    /// Opens or creates a file-based database.
    ///
    /// The path `:memory:` yields an in-memory provider.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteProviderConfig::default())
    }

    /// Opens a database with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteProviderConfig) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        if path_str == ":memory:" {
            return Self::in_memory_with_config(config);
        }
        Self::build(&path_str, config, None)
    }

    fn build(
        location: &str,
        config: SqliteProviderConfig,
        memory_anchor: Option<Connection>,
    ) -> StorageResult<Self> {
        let is_memory = memory_anchor.is_some();
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let enable_wal = config.enable_wal && !is_memory;

        let manager = SqliteConnectionManager::file(location).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            if is_memory {
                // Shared-cache readers otherwise hold table locks that writers
                // on other pooled connections cannot wait out.
                conn.execute_batch("PRAGMA read_uncommitted = 1;")?;
            }
            Ok(())
        });

        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        let pool = builder
            .build(manager)
            .map_err(|e| connection_failed(e.to_string()))?;

        let provider = Self {
            pool,
            config,
            is_memory,
            _memory_anchor: memory_anchor.map(Mutex::new),
            transaction_slot: TransactionSlot::new(),
        };
        provider.init_schema()?;

        info!(
            location = %location,
            is_memory = provider.is_memory,
            "Opened SQLite document provider"
        );
        Ok(provider)
    }

    /// Creates the collection registry if it is missing.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| connection_failed(e.to_string()))
    }

    /// Starts a transaction, returning the concrete handle.
    ///
    /// SQLite serializes writers, so every level runs as `BEGIN IMMEDIATE`,
    /// which is at least as strong as the level requested.
    pub fn begin(&self, isolation: IsolationLevel) -> StorageResult<SqliteTransaction> {
        let guard = self.transaction_slot.claim()?;
        let conn = self.get_connection()?;
        let tx = SqliteTransaction::begin(conn, isolation, guard)?;
        debug!(isolation = %isolation, "Began SQLite transaction");
        Ok(tx)
    }

    /// Fails while a transaction handle is live.
    ///
    /// Collection DDL on the provider would otherwise run beside the
    /// handle's transaction instead of inside it.
    pub(crate) fn ensure_no_transaction(&self) -> StorageResult<()> {
        self.transaction_slot.ensure_unclaimed()?;
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &SqliteProviderConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentProvider for SqliteProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(self.begin(isolation)?))
    }

    fn has_active_transaction(&self) -> bool {
        self.transaction_slot.is_claimed()
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map_err(|e| {
                StorageError::Backend(BackendError::Internal {
                    backend_name: "sqlite".to_string(),
                    message: format!("Health check failed: {}", e),
                    source: None,
                })
            })?;
        Ok(())
    }
}
