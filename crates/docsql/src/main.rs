//! DocSQL command line tool.
//!
//! Lists, creates and drops collections and reads or writes documents in any
//! database a registered provider can reach.

mod commands;
mod config;

use clap::Parser;
use docsql_persistence::DocumentStore;
use tracing::info;

use crate::config::CliConfig;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Logs go to stderr so stdout
/// stays machine readable.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("docsql={level},docsql_persistence={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();
    init_logging(&config.log_level);

    info!(
        provider = %config.provider,
        default_format = %config.format,
        "Connecting"
    );
    let store = DocumentStore::connect(&config.store_config()).await?;

    commands::run(&store, config.command).await
}
