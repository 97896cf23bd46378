//! Subcommand implementations.
//!
//! Results are written to stdout as JSON; logs go to stderr.

use anyhow::{Context, anyhow};
use docsql_persistence::{DocumentCollection, DocumentProvider, DocumentStore};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::config::Command;

type JsonCollection<'s> = DocumentCollection<'s, dyn DocumentProvider, Value>;

async fn open<'s>(store: &'s DocumentStore, name: &str) -> anyhow::Result<JsonCollection<'s>> {
    store
        .collection::<Value>(name)
        .await?
        .ok_or_else(|| anyhow!("collection '{}' does not exist", name))
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs one subcommand against `store`.
pub async fn run(store: &DocumentStore, command: Command) -> anyhow::Result<()> {
    debug!(command = ?command, "Running command");
    match command {
        Command::Collections => {
            let infos = store.collection_infos().await?;
            print(&serde_json::to_value(infos)?)
        }
        Command::Create { name, format } => {
            let format = format.unwrap_or(store.settings().default_format);
            let view = store
                .create_collection_with_format::<Value>(&name, format)
                .await?;
            print(&json!({ "created": view.name(), "format": view.format() }))
        }
        Command::Drop { name } => {
            let dropped = store.delete_collection(&name).await?;
            print(&json!({ "dropped": dropped }))
        }
        Command::Get { collection, id } => {
            let view = open(store, &collection).await?;
            let document = view.get(id).await?;
            print(&document.unwrap_or(Value::Null))
        }
        Command::Put {
            collection,
            json,
            id,
        } => {
            let document: Value =
                serde_json::from_str(&json).context("document is not valid JSON")?;
            let view = open(store, &collection).await?;
            let id = id.unwrap_or_else(Uuid::new_v4);
            view.add_or_update(id, &document).await?;
            print(&json!({ "id": id }))
        }
        Command::Remove { collection, id } => {
            let view = open(store, &collection).await?;
            let removed = view.remove(id).await?;
            print(&json!({ "removed": removed }))
        }
        Command::Scan { collection, limit } => {
            let view = open(store, &collection).await?;
            let mut cursor = view.iter().await?;
            let mut printed = 0;
            while limit.is_none_or(|limit| printed < limit) {
                let Some((id, document)) = cursor.next().await? else {
                    break;
                };
                println!("{}", json!({ "id": id, "document": document }));
                printed += 1;
            }
            cursor.close().await?;
            Ok(())
        }
    }
}
