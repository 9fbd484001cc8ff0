//! Inventory snapshot sources.
//!
//! Each `load` returns a whole snapshot; callers hold the `Arc` for the duration of one
//! resolution so a concurrent regeneration is never observed halfway.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::core::account::AccountInventory;
use crate::core::DispatchError;
use crate::infra::store::ObjectStore;

/// Inventory snapshot source.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Load the current snapshot.
    ///
    /// Fails with [`DispatchError::InventoryUnavailable`] when the snapshot cannot be
    /// read or parsed.
    async fn load(&self) -> Result<Arc<AccountInventory>, DispatchError>;
}

/// A fixed snapshot, for tests and embedding.
#[derive(Debug, Clone)]
pub struct StaticInventory {
    inventory: Arc<AccountInventory>,
}

impl StaticInventory {
    /// Wrap a snapshot.
    #[must_use]
    pub fn new(inventory: AccountInventory) -> Self {
        Self {
            inventory: Arc::new(inventory),
        }
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn load(&self) -> Result<Arc<AccountInventory>, DispatchError> {
        Ok(Arc::clone(&self.inventory))
    }
}

/// Inventory document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InventorySource for FileInventory {
    async fn load(&self) -> Result<Arc<AccountInventory>, DispatchError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DispatchError::InventoryUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let inventory = AccountInventory::from_json_str(&text)?;
        info!(path = %self.path.display(), accounts = inventory.len(), "inventory loaded");
        Ok(Arc::new(inventory))
    }
}

/// Inventory document stored in an object store.
#[derive(Clone)]
pub struct StoreInventory {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl StoreInventory {
    /// Source reading `key` from `store`.
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl InventorySource for StoreInventory {
    async fn load(&self) -> Result<Arc<AccountInventory>, DispatchError> {
        let bytes = self
            .store
            .get(&self.key)
            .await
            .map_err(|e| DispatchError::InventoryUnavailable(format!("{}: {e}", self.key)))?;
        let text = String::from_utf8(bytes).map_err(|e| {
            DispatchError::InventoryUnavailable(format!("{}: not UTF-8: {e}", self.key))
        })?;
        let inventory = AccountInventory::from_json_str(&text)?;
        info!(key = %self.key, accounts = inventory.len(), "inventory loaded");
        Ok(Arc::new(inventory))
    }
}
