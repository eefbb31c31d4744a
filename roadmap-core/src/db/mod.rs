//! Persistence layer for the tracker
//!
//! This module provides a trait-based abstraction over key-value stores,
//! allowing the overlay and the local catalog to live in a YAML file, a
//! SQLite database or plain memory behind the same interface.

mod memory_backend;
mod migration;
mod sqlite_backend;
mod traits;
mod yaml_backend;

pub use memory_backend::MemoryBackend;
pub use migration::{export_store_json, import_store_json, migrate_store};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, KeyValueStore, StoreStats};
pub use yaml_backend::YamlBackend;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Infers the backend from the file extension
pub fn backend_for_path(path: &Path) -> BackendType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => BackendType::Yaml,
        Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
        _ => BackendType::Yaml, // Default to YAML
    }
}

/// Creates a store backend based on the file extension or explicit type
pub fn create_backend(
    path: &Path,
    backend_type: Option<BackendType>,
) -> Result<Arc<dyn KeyValueStore>> {
    let bt = backend_type.unwrap_or_else(|| backend_for_path(path));

    match bt {
        BackendType::Yaml => Ok(Arc::new(YamlBackend::new(path))),
        BackendType::Sqlite => Ok(Arc::new(SqliteBackend::new(path)?)),
        BackendType::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Reads and deserializes the value under `key`
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    store
        .get(key)?
        .map(|value| {
            serde_json::from_value(value)
                .with_context(|| format!("Stored value under {:?} has an unexpected shape", key))
        })
        .transpose()
}

/// Serializes `value` and stores it under `key`
pub fn write_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).context("Failed to serialize to JSON")?;
    store.set(key, &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_backend_inferred_from_extension() {
        assert_eq!(backend_for_path(&PathBuf::from("x.db")), BackendType::Sqlite);
        assert_eq!(backend_for_path(&PathBuf::from("x.yml")), BackendType::Yaml);
        assert_eq!(backend_for_path(&PathBuf::from("x")), BackendType::Yaml);
    }

    #[test]
    fn test_typed_helpers() {
        let store = MemoryBackend::new();
        write_json(&store, "selected", &Some("frontend".to_string())).unwrap();
        let selected: Option<Option<String>> = read_json(&store, "selected").unwrap();
        assert_eq!(selected, Some(Some("frontend".to_string())));

        let wrong: Result<Option<Vec<u32>>> = read_json(&store, "selected");
        assert!(wrong.is_err());
    }
}
