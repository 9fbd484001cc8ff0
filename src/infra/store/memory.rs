//! In-memory object store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::DispatchError;
use crate::infra::store::ObjectStore;

/// Object store held in memory, for development and tests.
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an object.
    pub fn put(&self, key: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.objects.write().insert(key.into(), contents.into());
    }

    /// Delete an object.
    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    /// Simulate an outage: every call fails with `StoreUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DispatchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DispatchError::StoreUnavailable("in-memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, DispatchError> {
        self.check()?;
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, DispatchError> {
        self.check()?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| DispatchError::TemplateNotFound(key.to_string()))
    }
}
