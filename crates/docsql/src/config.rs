//! Command line configuration.
//!
//! Every global option can also be set through the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DOCSQL_PROVIDER` | sqlite | Registered provider name |
//! | `DOCSQL_CONNECTION` | docsql.db | Provider connection string |
//! | `DOCSQL_LOG_LEVEL` | warn | Log level |
//! | `DOCSQL_DEFAULT_FORMAT` | JSON | Format for new collections |

use clap::{Parser, Subcommand};
use docsql_persistence::store::DEFAULT_CONNECTION_STRING;
use docsql_persistence::{StorageFormat, StoreConfig};
use uuid::Uuid;

/// Command line options for the `docsql` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "docsql")]
#[command(about = "Inspect and edit document collections stored in a SQL database")]
pub struct CliConfig {
    /// Provider to load (sqlite, postgres).
    #[arg(long, env = "DOCSQL_PROVIDER", default_value = "sqlite")]
    pub provider: String,

    /// Connection string: a file path for SQLite, a postgres:// URL for PostgreSQL.
    #[arg(long, env = "DOCSQL_CONNECTION", default_value = DEFAULT_CONNECTION_STRING)]
    pub connection: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "DOCSQL_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Storage format for collections created without --format.
    #[arg(long, env = "DOCSQL_DEFAULT_FORMAT", default_value = "JSON")]
    pub format: StorageFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once connected.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List registered collections.
    Collections,

    /// Create a collection.
    Create {
        name: String,
        /// Storage format (JSON or BSON); defaults to the global --format.
        #[arg(long)]
        format: Option<StorageFormat>,
    },

    /// Delete a collection and all its documents.
    Drop { name: String },

    /// Print one document.
    Get { collection: String, id: Uuid },

    /// Insert or replace a document given as JSON.
    Put {
        collection: String,
        json: String,
        /// Document id; a new one is generated when omitted.
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Delete one document.
    Remove { collection: String, id: Uuid },

    /// Print documents as JSON lines.
    Scan {
        collection: String,
        /// Stop after this many documents.
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl CliConfig {
    /// Returns the store configuration for these options.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            provider: self.provider.clone(),
            connection_string: self.connection.clone(),
            default_format: self.format,
        }
    }
}
