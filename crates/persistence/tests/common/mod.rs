//! Test infrastructure for the persistence layer.
//!
//! File-backed providers live in a temporary directory that is removed when
//! the returned [`TestDb`] is dropped.

#![allow(dead_code)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use docsql_persistence::Document;
use docsql_persistence::backends::sqlite::{SqliteProvider, SqliteProviderConfig};

/// A provider over a fresh database file.
pub struct TestDb {
    pub provider: SqliteProvider,
    pub path: PathBuf,
    // Dropped after the provider so the file outlives its connections.
    _dir: TempDir,
}

impl TestDb {
    /// Opens a raw connection to the same file, bypassing the provider.
    pub fn raw_connection(&self) -> rusqlite::Connection {
        let conn = rusqlite::Connection::open(&self.path).expect("Failed to open raw connection");
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .expect("Failed to set busy timeout");
        conn
    }

    /// Reopens the same file with a new provider.
    pub fn reopen(&self) -> SqliteProvider {
        SqliteProvider::open(&self.path).expect("Failed to reopen SQLite provider")
    }
}

pub fn file_db() -> TestDb {
    file_db_with_config(SqliteProviderConfig::default())
}

pub fn file_db_with_config(config: SqliteProviderConfig) -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("docsql.db");
    let provider =
        SqliteProvider::with_config(&path, config).expect("Failed to create SQLite provider");
    TestDb {
        provider,
        path,
        _dir: dir,
    }
}

pub fn memory_provider() -> SqliteProvider {
    SqliteProvider::in_memory().expect("Failed to create SQLite provider")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    pub color: String,
    pub size: u32,
}

impl Document for Widget {
    fn collection_name() -> &'static str {
        "Widgets"
    }
}

pub fn widget(name: &str, color: &str, size: u32) -> Widget {
    Widget {
        name: name.to_string(),
        color: color.to_string(),
        size,
    }
}
