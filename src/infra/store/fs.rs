//! Filesystem-backed object store.
//!
//! Keys are paths relative to the root directory with `/` separators.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::DispatchError;
use crate::infra::store::ObjectStore;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    fn unavailable(&self, e: &std::io::Error) -> DispatchError {
        DispatchError::StoreUnavailable(format!("{}: {e}", self.root.display()))
    }
}

#[async_trait]
impl ObjectStore for FileSystemStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, DispatchError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound && dir != self.root => continue,
                Err(e) => return Err(self.unavailable(&e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| self.unavailable(&e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| self.unavailable(&e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, DispatchError> {
        if key.split('/').any(|part| part == "..") {
            return Err(DispatchError::TemplateNotFound(key.to_string()));
        }
        match tokio::fs::read(self.root.join(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(DispatchError::TemplateNotFound(key.to_string()))
            }
            Err(e) => Err(self.unavailable(&e)),
        }
    }
}
