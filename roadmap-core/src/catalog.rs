use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::models::{Item, WorkflowStatus, WorkingSet};
use crate::track::Track;
use crate::transitions::ResetScope;

/// The fully local track, persisted wholesale under its own store key and
/// untouched by network state
pub struct LocalCatalog<S: WorkflowStatus> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    working: WorkingSet<S>,
    /// Stored items that do not decode for this workflow, written back after the readable ones
    unreadable: Vec<Value>,
    /// False when the stored catalog could not be read; it is then left
    /// alone until it is cleared or replaced
    writable: bool,
}

impl<S: WorkflowStatus> LocalCatalog<S> {
    /// Opens the catalog stored under `key`, seeding it with [`default_catalog`]
    /// when the key has never been written
    pub fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut catalog = Self {
            store,
            key,
            working: WorkingSet::default(),
            unreadable: Vec::new(),
            writable: true,
        };

        match catalog.store.get(&catalog.key) {
            Ok(Some(Value::Array(entries))) => {
                let mut items = Vec::with_capacity(entries.len());
                for entry in entries {
                    match serde_json::from_value::<Item<S>>(entry.clone()) {
                        Ok(item) => items.push(item),
                        Err(e) => {
                            warn!(key = %catalog.key, error = %e, "keeping unreadable catalog item as is");
                            catalog.unreadable.push(entry);
                        }
                    }
                }
                catalog.working = WorkingSet::from_items(items);
            }
            Ok(Some(_)) => {
                warn!(key = %catalog.key, "local catalog is not a JSON array, edits will not be saved");
                catalog.writable = false;
            }
            Ok(None) => catalog.seed(),
            Err(e) => {
                warn!(key = %catalog.key, error = %e, "local catalog unreadable, edits will not be saved");
                catalog.writable = false;
            }
        }
        catalog
    }

    /// Whether edits are being saved to the store
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Removes the stored catalog and starts over from [`default_catalog`]
    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(&self.key)?;
        self.unreadable.clear();
        self.writable = true;
        self.seed();
        Ok(())
    }

    fn seed(&mut self) {
        debug!(key = %self.key, "seeding local catalog");
        self.working = WorkingSet::from_items(default_catalog());
        self.persist();
    }

    fn persist(&self) {
        if !self.writable {
            warn!(key = %self.key, "local catalog was unreadable, not overwriting it");
            return;
        }
        let mut entries = match serde_json::to_value(self.working.items()) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to serialize local catalog");
                return;
            }
        };
        entries.extend(self.unreadable.iter().cloned());
        if let Err(e) = self.store.set(&self.key, &Value::Array(entries)) {
            warn!(key = %self.key, error = %e, "failed to persist local catalog");
        }
    }
}

impl<S: WorkflowStatus> Track<S> for LocalCatalog<S> {
    fn working_set(&self) -> &WorkingSet<S> {
        &self.working
    }

    fn commit(&mut self, items: Vec<Item<S>>) {
        self.working = WorkingSet::from_items(items);
        self.persist();
    }

    fn replace_all(&mut self, items: Vec<Item<S>>) {
        self.unreadable.clear();
        self.writable = true;
        self.commit(items);
    }

    fn reset_scope(&self) -> ResetScope {
        ResetScope::StatusOnly
    }
}

/// Starter items for a catalog that has never been saved
pub fn default_catalog<S: WorkflowStatus>() -> Vec<Item<S>> {
    let seed = [
        (
            "1",
            "React Components",
            "Learn the basic building blocks",
            S::completed(),
            "Function and class components covered",
        ),
        (
            "2",
            "JSX Syntax",
            "Get comfortable with JSX",
            S::in_progress(),
            "Working through conditional rendering",
        ),
        (
            "3",
            "State Management",
            "Managing component state",
            S::initial(),
            "",
        ),
    ];

    seed.into_iter()
        .map(|(id, title, description, status, notes)| {
            let mut item = Item::new(id, title);
            item.description = description.to_string();
            item.status = status;
            item.notes = notes.to_string();
            item.category = "frontend".to_string();
            item
        })
        .collect()
}

/// Which track the application reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    LocalOnly,
    RemoteBacked,
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::LocalOnly => write!(f, "local"),
            TrackSource::RemoteBacked => write!(f, "remote"),
        }
    }
}

/// Configured track preference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackPreference {
    /// Remote when the remote working set has items, otherwise local
    #[default]
    Auto,
    Local,
    Remote,
}

impl TrackPreference {
    pub fn resolve<S: WorkflowStatus>(self, remote: &WorkingSet<S>) -> TrackSource {
        match self {
            TrackPreference::Local => TrackSource::LocalOnly,
            TrackPreference::Remote => TrackSource::RemoteBacked,
            TrackPreference::Auto if remote.is_empty() => TrackSource::LocalOnly,
            TrackPreference::Auto => TrackSource::RemoteBacked,
        }
    }
}
