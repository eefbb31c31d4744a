//! YAML file storage backend
//!
//! This backend stores every key in a single YAML document, using the
//! locked `Storage` file so concurrent invocations do not lose each other's keys.

use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::traits::{BackendType, KeyValueStore};
use crate::storage::Storage;

/// YAML file backend implementation
pub struct YamlBackend {
    storage: Storage,
    path: PathBuf,
}

impl YamlBackend {
    /// Creates a new YAML backend for the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            storage: Storage::new(&path),
            path,
        }
    }
}

impl KeyValueStore for YamlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.storage.load()?.entries.remove(key))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.storage.update_atomically(|doc| {
            doc.entries.insert(key.to_string(), value.clone());
        })
    }

    fn remove(&self, key: &str) -> Result<bool> {
        self.storage
            .update_atomically(|doc| doc.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.storage.load()?.entries.into_keys().collect())
    }
}
