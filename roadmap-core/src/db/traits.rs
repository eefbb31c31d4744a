//! Key-value store abstraction
//!
//! The tracker persists two independent documents (the overlay map and the
//! local catalog) plus the remembered roadmap selection. All of them go
//! through this trait, so the backing medium can be swapped freely.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

/// Types of store backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// YAML file storage (single file)
    Yaml,
    /// SQLite database storage
    Sqlite,
    /// Process-local, nothing is written to disk
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Yaml => write!(f, "YAML"),
            BackendType::Sqlite => write!(f, "SQLite"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

impl BackendType {
    /// Parses a backend name as written in configuration
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "yaml" | "yml" => Some(BackendType::Yaml),
            "sqlite" | "db" => Some(BackendType::Sqlite),
            "memory" => Some(BackendType::Memory),
            _ => None,
        }
    }
}

/// Durable string-keyed store of JSON values.
///
/// Writes are synchronous; once `set` returns the value is visible to the
/// next `get` from any handle on the same medium.
pub trait KeyValueStore: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path of the backing file, if any
    fn location(&self) -> Option<&Path>;

    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Removes `key`; returns whether it was present
    fn remove(&self, key: &str) -> Result<bool>;

    /// Lists every key in the store
    fn keys(&self) -> Result<Vec<String>>;

    /// Returns true if a value is stored under `key`
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns statistics about the store
    fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            key_count: self.keys()?.len(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a store
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub key_count: usize,
    pub backend_type: BackendType,
}
