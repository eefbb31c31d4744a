//! Migration utilities for moving a store between backends
//!
//! This module copies every key from one backend to another and dumps or
//! restores a whole store as a single JSON object for backups.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use super::traits::KeyValueStore;

/// Copies every key of `from` into `to`, overwriting keys that already exist
///
/// # Returns
/// The number of keys copied
pub fn migrate_store(from: &dyn KeyValueStore, to: &dyn KeyValueStore) -> Result<usize> {
    let mut copied = 0;
    for key in from.keys().context("Failed to list source keys")? {
        if let Some(value) = from.get(&key)? {
            to.set(&key, &value)
                .with_context(|| format!("Failed to copy key {:?}", key))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Writes the whole store to a JSON file as one `{key: value}` object
///
/// # Arguments
/// * `store` - The store to dump
/// * `json_path` - Path to the destination JSON file
pub fn export_store_json<P: AsRef<Path>>(store: &dyn KeyValueStore, json_path: P) -> Result<()> {
    let mut dump = Map::new();
    for key in store.keys()? {
        if let Some(value) = store.get(&key)? {
            dump.insert(key, value);
        }
    }

    let json = serde_json::to_string_pretty(&Value::Object(dump))
        .context("Failed to serialize store to JSON")?;
    fs::write(json_path.as_ref(), json)
        .with_context(|| format!("Failed to write JSON file: {:?}", json_path.as_ref()))?;
    Ok(())
}

/// Restores keys from a JSON dump produced by [`export_store_json`]
///
/// # Returns
/// The number of keys restored
pub fn import_store_json<P: AsRef<Path>>(store: &dyn KeyValueStore, json_path: P) -> Result<usize> {
    let content = fs::read_to_string(json_path.as_ref())
        .with_context(|| format!("Failed to read JSON file: {:?}", json_path.as_ref()))?;
    let dump: Map<String, Value> =
        serde_json::from_str(&content).context("Store dump must be a JSON object")?;

    let count = dump.len();
    for (key, value) in dump {
        store.set(&key, &value)?;
    }
    Ok(count)
}
