//! Application-facing document store.
//!
//! [`DocumentStore`] wraps one [`DocumentProvider`] and hands out typed
//! collection views. Providers are resolved by name through a
//! [`ProviderRegistry`], usually from a [`StoreConfig`].
//!
//! # Example
//!
//! ```no_run
//! use docsql_persistence::store::{Document, DocumentStore, StoreConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Widget {
//!     name: String,
//! }
//!
//! impl Document for Widget {
//!     fn collection_name() -> &'static str {
//!         "Widgets"
//!     }
//! }
//!
//! # async fn example() -> docsql_persistence::StorageResult<()> {
//! let store = DocumentStore::connect(&StoreConfig::from_env()).await?;
//! let widgets = store
//!     .create_typed_collection::<Widget>(store.settings().default_format)
//!     .await?;
//! widgets.insert(&Widget { name: "x".into() }).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collection::{DocumentCollection, RawCollection};
use crate::core::{DocumentProvider, IsolationLevel, Transaction};
use crate::error::{CollectionError, StorageError, StorageResult};
use crate::factory::ProviderRegistry;
use crate::types::{CollectionInfo, StorageFormat};

/// Connection string used when none is configured: a SQLite file in the
/// working directory.
pub const DEFAULT_CONNECTION_STRING: &str = "docsql.db";

/// A value stored in a collection named after its type.
pub trait Document: Serialize + DeserializeOwned {
    /// The collection this type lives in.
    fn collection_name() -> &'static str;
}

/// Store-wide defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Format used when a collection is created without one.
    #[serde(default)]
    pub default_format: StorageFormat,
}

/// Which provider to load and how to reach its database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Registered provider name.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider-specific connection string.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Format used when a collection is created without one.
    #[serde(default)]
    pub default_format: StorageFormat,
}

fn default_provider() -> String {
    "sqlite".to_string()
}

fn default_connection_string() -> String {
    DEFAULT_CONNECTION_STRING.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            connection_string: default_connection_string(),
            default_format: StorageFormat::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for `provider` and `connection_string`.
    pub fn new(provider: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Builds a configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `DOCSQL_PROVIDER` (default: "sqlite")
    /// - `DOCSQL_CONNECTION` (default: "docsql.db")
    /// - `DOCSQL_DEFAULT_FORMAT` (default: "JSON"; unparseable values fall back to it)
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("DOCSQL_PROVIDER").unwrap_or_else(|_| default_provider()),
            connection_string: std::env::var("DOCSQL_CONNECTION")
                .unwrap_or_else(|_| default_connection_string()),
            default_format: std::env::var("DOCSQL_DEFAULT_FORMAT")
                .ok()
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Returns the settings part of this configuration.
    pub fn settings(&self) -> StoreSettings {
        StoreSettings {
            default_format: self.default_format,
        }
    }
}

/// Typed access to the collections of one database.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    provider: Arc<dyn DocumentProvider>,
    settings: StoreSettings,
}

impl DocumentStore {
    /// Wraps a provider with default settings.
    pub fn new(provider: Arc<dyn DocumentProvider>) -> Self {
        Self::with_settings(provider, StoreSettings::default())
    }

    /// Wraps a provider.
    pub fn with_settings(provider: Arc<dyn DocumentProvider>, settings: StoreSettings) -> Self {
        Self { provider, settings }
    }

    /// Resolves the configured provider among the built-in ones.
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        Self::connect_with(&ProviderRegistry::with_builtin(), config).await
    }

    /// Resolves the configured provider in `registry`.
    pub async fn connect_with(
        registry: &ProviderRegistry,
        config: &StoreConfig,
    ) -> StorageResult<Self> {
        let provider = registry
            .connect(&config.provider, &config.connection_string)
            .await?;
        info!(provider = %provider.kind(), "Connected document store");
        Ok(Self::with_settings(provider, config.settings()))
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.provider
    }

    /// Returns the store settings.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Returns true iff the collection is registered.
    pub async fn collection_exists(&self, name: &str) -> StorageResult<bool> {
        self.provider.collection_exists(name).await
    }

    /// Returns true iff the collection for `T` is registered.
    pub async fn typed_collection_exists<T: Document>(&self) -> StorageResult<bool> {
        self.collection_exists(T::collection_name()).await
    }

    /// Lists all registered collections.
    pub async fn collection_infos(&self) -> StorageResult<Vec<CollectionInfo>> {
        self.provider.collection_infos().await
    }

    /// Returns a typed view, or `None` if the collection does not exist.
    pub async fn collection<T>(
        &self,
        name: &str,
    ) -> StorageResult<Option<DocumentCollection<'_, dyn DocumentProvider, T>>> {
        DocumentCollection::open(&*self.provider, name).await
    }

    /// Returns the view for `T`'s collection, or `None` if it does not exist.
    pub async fn typed_collection<T: Document>(
        &self,
    ) -> StorageResult<Option<DocumentCollection<'_, dyn DocumentProvider, T>>> {
        self.collection(T::collection_name()).await
    }

    /// Returns an untyped view, or `None` if the collection does not exist.
    pub async fn raw_collection(
        &self,
        name: &str,
    ) -> StorageResult<Option<RawCollection<'_, dyn DocumentProvider>>> {
        RawCollection::open(&*self.provider, name).await
    }

    /// Creates a collection in the default format and returns its view.
    pub async fn create_collection<T>(
        &self,
        name: &str,
    ) -> StorageResult<DocumentCollection<'_, dyn DocumentProvider, T>> {
        self.create_collection_with_format(name, self.settings.default_format)
            .await
    }

    /// Creates a collection and returns its view.
    ///
    /// # Errors
    ///
    /// * `CollectionError::InvalidName` for the reserved registry name
    /// * `CollectionError::AlreadyExists` if the name is taken
    pub async fn create_collection_with_format<T>(
        &self,
        name: &str,
        format: StorageFormat,
    ) -> StorageResult<DocumentCollection<'_, dyn DocumentProvider, T>> {
        self.provider.create_collection(name, format).await?;
        self.collection(name).await?.ok_or_else(|| {
            StorageError::Collection(CollectionError::NotFound {
                name: name.to_string(),
            })
        })
    }

    /// Creates the collection for `T`.
    pub async fn create_typed_collection<T: Document>(
        &self,
        format: StorageFormat,
    ) -> StorageResult<DocumentCollection<'_, dyn DocumentProvider, T>> {
        self.create_collection_with_format(T::collection_name(), format)
            .await
    }

    /// Deletes a collection. Returns false if it did not exist.
    pub async fn delete_collection(&self, name: &str) -> StorageResult<bool> {
        self.provider.delete_collection(name).await
    }

    /// Deletes the collection for `T`.
    pub async fn delete_typed_collection<T: Document>(&self) -> StorageResult<bool> {
        self.delete_collection(T::collection_name()).await
    }

    /// Starts a transaction on the provider.
    ///
    /// Build views on the returned handle to work inside it.
    pub async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> StorageResult<Box<dyn Transaction>> {
        self.provider.begin_transaction(isolation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.provider, "sqlite");
        assert_eq!(config.connection_string, DEFAULT_CONNECTION_STRING);
        assert_eq!(config.default_format, StorageFormat::Json);
    }

    #[test]
    fn test_store_config_format_name() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"provider": "postgres", "default_format": "BSON"}"#).unwrap();
        assert_eq!(config.provider, "postgres");
        assert_eq!(config.settings().default_format, StorageFormat::Bson);
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use serde::{Deserialize, Serialize};

        use crate::error::{CollectionError, ProviderError, StorageError};
        use crate::store::{Document, DocumentStore, StoreConfig};
        use crate::types::StorageFormat;

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Note {
            text: String,
        }

        impl Document for Note {
            fn collection_name() -> &'static str {
                "Notes"
            }
        }

        async fn memory_store(default_format: StorageFormat) -> DocumentStore {
            let config = StoreConfig {
                default_format,
                ..StoreConfig::new("sqlite", ":memory:")
            };
            DocumentStore::connect(&config).await.unwrap()
        }

        #[tokio::test]
        async fn test_typed_collection_lifecycle() {
            let store = memory_store(StorageFormat::Bson).await;
            assert!(!store.typed_collection_exists::<Note>().await.unwrap());
            assert!(store.typed_collection::<Note>().await.unwrap().is_none());

            let notes = store
                .create_typed_collection::<Note>(store.settings().default_format)
                .await
                .unwrap();
            assert_eq!(notes.format(), StorageFormat::Bson);
            let id = notes
                .insert(&Note {
                    text: "hi".to_string(),
                })
                .await
                .unwrap();

            let reopened = store.typed_collection::<Note>().await.unwrap().unwrap();
            assert_eq!(reopened.get(id).await.unwrap().unwrap().text, "hi");

            assert!(store.delete_typed_collection::<Note>().await.unwrap());
            assert!(!store.delete_typed_collection::<Note>().await.unwrap());
        }

        #[tokio::test]
        async fn test_create_uses_default_format() {
            let store = memory_store(StorageFormat::Json).await;
            let view = store
                .create_collection::<serde_json::Value>("Loose")
                .await
                .unwrap();
            assert_eq!(view.format(), StorageFormat::Json);

            let err = store
                .create_collection::<serde_json::Value>("Loose")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                StorageError::Collection(CollectionError::AlreadyExists { .. })
            ));
        }

        #[tokio::test]
        async fn test_connect_unknown_provider() {
            let config = StoreConfig::new("oracle", "whatever");
            let err = DocumentStore::connect(&config).await.unwrap_err();
            assert!(matches!(
                err,
                StorageError::Provider(ProviderError::NotRegistered { .. })
            ));
        }
    }
}
