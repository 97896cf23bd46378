//! Provider resolution by name.
//!
//! A [`ProviderRegistry`] maps provider names to constructor functions.
//! Backends compiled into the crate are added by
//! [`ProviderRegistry::with_builtin`]; applications can register their own.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::core::DocumentProvider;
use crate::error::{ProviderError, StorageError, StorageResult};

/// Future returned by a [`ProviderConstructor`].
pub type ProviderFuture =
    Pin<Box<dyn Future<Output = StorageResult<Arc<dyn DocumentProvider>>> + Send>>;

/// Builds a provider from a connection string.
pub type ProviderConstructor = fn(String) -> ProviderFuture;

/// Maps provider names (case-insensitive) to constructors.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

#[cfg(feature = "sqlite")]
fn sqlite_constructor(connection_string: String) -> ProviderFuture {
    Box::pin(async move {
        let provider = crate::backends::sqlite::SqliteProvider::open(&connection_string)?;
        Ok(Arc::new(provider) as Arc<dyn DocumentProvider>)
    })
}

#[cfg(feature = "postgres")]
fn postgres_constructor(connection_string: String) -> ProviderFuture {
    Box::pin(async move {
        let provider =
            crate::backends::postgres::PostgresProvider::from_connection_string(&connection_string)
                .await?;
        Ok(Arc::new(provider) as Arc<dyn DocumentProvider>)
    })
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every backend enabled at compile time.
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "sqlite")]
        registry.register("sqlite", sqlite_constructor);
        #[cfg(feature = "postgres")]
        {
            registry.register("postgres", postgres_constructor);
            registry.register("postgresql", postgres_constructor);
        }
        registry
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, constructor: ProviderConstructor) -> &mut Self {
        self.constructors.insert(name.to_lowercase(), constructor);
        self
    }

    /// Returns true if a constructor is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds the provider registered under `name`.
    ///
    /// # Errors
    ///
    /// * `ProviderError::NotRegistered` if nothing is registered under `name`
    /// * `ProviderError::LoadFailed` if the constructor fails
    pub async fn connect(
        &self,
        name: &str,
        connection_string: &str,
    ) -> StorageResult<Arc<dyn DocumentProvider>> {
        let constructor = self.constructors.get(&name.to_lowercase()).ok_or_else(|| {
            StorageError::Provider(ProviderError::NotRegistered {
                name: name.to_string(),
            })
        })?;

        debug!(provider = %name, "Loading provider");
        constructor(connection_string.to_string())
            .await
            .map_err(|e| {
                StorageError::Provider(ProviderError::LoadFailed {
                    name: name.to_string(),
                    source: Box::new(e),
                })
            })
    }
}
