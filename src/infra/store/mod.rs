//! Object stores and the template store client.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::schema::ValidationErrors;
use crate::core::DispatchError;
use crate::util::keys::is_template_key;

pub mod fs;
pub mod memory;

pub use fs::FileSystemStore;
pub use memory::InMemoryStore;

/// Read-only object store abstraction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys under `prefix`, in any order.
    ///
    /// Fails with [`DispatchError::StoreUnavailable`] when the store cannot be reached.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, DispatchError>;

    /// Object contents.
    ///
    /// Fails with [`DispatchError::TemplateNotFound`] for a missing key and
    /// [`DispatchError::StoreUnavailable`] when the store cannot be reached.
    async fn get(&self, key: &str) -> Result<Vec<u8>, DispatchError>;
}

/// Lists and fetches template documents.
#[derive(Clone)]
pub struct TemplateStoreClient {
    store: Arc<dyn ObjectStore>,
}

impl TemplateStoreClient {
    /// Wrap a store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Template keys for a worker prefix, sorted.
    ///
    /// A prefix that is itself a template key names exactly that template and is not
    /// listed.
    ///
    /// # Errors
    ///
    /// The store's listing error.
    pub async fn list_templates(&self, prefix: &str) -> Result<Vec<String>, DispatchError> {
        if is_template_key(prefix) {
            return Ok(vec![prefix.to_string()]);
        }
        let mut keys: Vec<String> = self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .filter(|k| is_template_key(k))
            .collect();
        keys.sort();
        keys.dedup();
        debug!(prefix, templates = keys.len(), "listed templates");
        Ok(keys)
    }

    /// Fetch and parse a YAML template.
    ///
    /// # Errors
    ///
    /// The store's fetch error, or [`DispatchError::SchemaValidation`] when the document
    /// is not parseable YAML.
    pub async fn fetch_template(&self, key: &str) -> Result<Value, DispatchError> {
        let bytes = self.store.get(key).await?;
        serde_yaml::from_slice(&bytes).map_err(|e| {
            ValidationErrors::single("", format!("document is not valid YAML: {e}")).into()
        })
    }
}

impl std::fmt::Debug for TemplateStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStoreClient").finish_non_exhaustive()
    }
}
