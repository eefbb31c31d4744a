//! Reconciliation engine
//!
//! Combines the items of the most recent remote fetch with the locally
//! persisted overlay of user edits. The rule is simple: the overlay wins
//! for everything a user can edit (status, notes, deadline, estimate,
//! first-completion time) and the remote wins for everything only the
//! source knows (title, description, category, links). Overlay records are
//! keyed by item id, not by roadmap, so switching roadmaps or re-fetching
//! never loses an edit.

use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::models::{Item, Overlay, OverlayRecord, WorkflowStatus, WorkingSet};
use crate::track::Track;
use crate::transitions::ResetScope;

/// Merges remote items with overlay records, preserving remote order.
///
/// Overlay records with no matching remote item are not part of the result.
pub fn merge<S: WorkflowStatus>(remote: &[Item<S>], overlay: &Overlay<S>) -> Vec<Item<S>> {
    remote
        .iter()
        .map(|item| match overlay.get(&item.id) {
            Some(record) => apply_overlay(item, record),
            None => item.clone(),
        })
        .collect()
}

fn apply_overlay<S: WorkflowStatus>(remote: &Item<S>, record: &OverlayRecord<S>) -> Item<S> {
    let mut merged = remote.clone();
    merged.status = record.status.unwrap_or(remote.status);
    merged.deadline = record.deadline.or(remote.deadline);
    merged.estimated_hours = record.estimated_hours.or(remote.estimated_hours);
    merged.completed_at = record.completed_at.or(remote.completed_at);
    if !record.notes.is_empty() {
        merged.notes = record.notes.clone();
    }
    merged
}

/// Folds the editable fields of `items` into `overlay`, leaving other ids untouched
pub fn write_back<S: WorkflowStatus>(overlay: &mut Overlay<S>, items: &[Item<S>]) {
    for item in items {
        overlay.insert(item.id.clone(), item.overlay_record());
    }
}

/// Overlay as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOverlay<S: WorkflowStatus> {
    pub records: Overlay<S>,
    /// Entries that do not decode for this workflow, kept verbatim so they
    /// are written back unchanged
    pub unreadable: Map<String, Value>,
}

impl<S: WorkflowStatus> Default for StoredOverlay<S> {
    fn default() -> Self {
        Self {
            records: Overlay::new(),
            unreadable: Map::new(),
        }
    }
}

/// Loads the overlay stored under `key`.
///
/// Records that do not decode for this workflow are set aside instead of
/// discarding the whole overlay. Fails when the store cannot be read or the
/// stored value is not a JSON object.
pub fn load_overlay<S: WorkflowStatus>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<StoredOverlay<S>> {
    let mut stored = StoredOverlay::default();
    let Some(raw) = store.get(key)? else {
        return Ok(stored);
    };
    let Value::Object(entries) = raw else {
        anyhow::bail!("overlay under '{}' is not a JSON object", key);
    };

    for (id, value) in entries {
        match serde_json::from_value::<OverlayRecord<S>>(value.clone()) {
            Ok(record) => {
                stored.records.insert(id, record);
            }
            Err(e) => {
                warn!(key, id = %id, error = %e, "keeping unreadable overlay record as is");
                stored.unreadable.insert(id, value);
            }
        }
    }
    Ok(stored)
}

/// Owns the remote-backed working set and is the only writer of the overlay
pub struct ReconciliationEngine<S: WorkflowStatus> {
    store: Arc<dyn KeyValueStore>,
    overlay_key: String,
    overlay: Overlay<S>,
    unreadable: Map<String, Value>,
    /// False when the stored overlay could not be read; it is then left
    /// alone until it is cleared or replaced
    writable: bool,
    working: WorkingSet<S>,
}

impl<S: WorkflowStatus> ReconciliationEngine<S> {
    /// Opens the engine over `store`, loading the overlay kept under `overlay_key`.
    /// The working set starts empty until the first remote fetch is applied.
    pub fn open(store: Arc<dyn KeyValueStore>, overlay_key: impl Into<String>) -> Self {
        let overlay_key = overlay_key.into();
        let (stored, writable) = match load_overlay(store.as_ref(), &overlay_key) {
            Ok(stored) => (stored, true),
            Err(e) => {
                warn!(key = %overlay_key, error = %e, "overlay unreadable, edits will not be saved");
                (StoredOverlay::default(), false)
            }
        };
        debug!(
            key = %overlay_key,
            records = stored.records.len(),
            unreadable = stored.unreadable.len(),
            "overlay loaded"
        );
        Self {
            store,
            overlay_key,
            overlay: stored.records,
            unreadable: stored.unreadable,
            writable,
            working: WorkingSet::default(),
        }
    }

    pub fn overlay(&self) -> &Overlay<S> {
        &self.overlay
    }

    /// Whether edits are being saved to the store
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Merges freshly normalized remote items with the overlay and makes the
    /// result the working set. The merged editable fields are written back,
    /// so applying the same fetch twice changes nothing.
    pub fn apply_remote(&mut self, remote: &[Item<S>]) -> &WorkingSet<S> {
        let merged = merge(remote, &self.overlay);
        debug!(items = merged.len(), "applying remote items");
        self.commit(merged);
        &self.working
    }

    /// Drops every overlay record, readable or not, and keeps the working set as it is
    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
        self.unreadable.clear();
        match self.store.remove(&self.overlay_key) {
            Ok(_) => self.writable = true,
            Err(e) => warn!(key = %self.overlay_key, error = %e, "failed to clear overlay"),
        }
    }

    fn persist(&self) {
        if !self.writable {
            warn!(key = %self.overlay_key, "overlay was unreadable, not overwriting it");
            return;
        }
        let mut entries = match serde_json::to_value(&self.overlay) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!(error = %e, "failed to serialize overlay");
                return;
            }
        };
        for (id, value) in &self.unreadable {
            entries.entry(id.clone()).or_insert_with(|| value.clone());
        }
        // Durability is best-effort; the in-memory working set already reflects the change
        if let Err(e) = self.store.set(&self.overlay_key, &Value::Object(entries)) {
            warn!(key = %self.overlay_key, error = %e, "failed to persist overlay");
        }
    }
}

impl<S: WorkflowStatus> Track<S> for ReconciliationEngine<S> {
    fn working_set(&self) -> &WorkingSet<S> {
        &self.working
    }

    fn commit(&mut self, items: Vec<Item<S>>) {
        write_back(&mut self.overlay, &items);
        for item in &items {
            self.unreadable.remove(&item.id);
        }
        self.working = WorkingSet::from_items(items);
        self.persist();
    }

    fn replace_all(&mut self, items: Vec<Item<S>>) {
        let mut overlay = Overlay::new();
        write_back(&mut overlay, &items);
        self.overlay = overlay;
        self.unreadable.clear();
        self.writable = true;
        self.working = WorkingSet::from_items(items);
        self.persist();
    }

    fn reset_scope(&self) -> ResetScope {
        ResetScope::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::models::{ItemPatch, NewItem, TechStatus};
    use crate::normalize::normalize;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    const KEY: &str = "roadmap-api-technologies";

    fn remote(ids: &[&str]) -> Vec<Item<TechStatus>> {
        ids.iter()
            .map(|id| {
                let mut item = Item::new(*id, format!("Title {}", id));
                item.category = "Frontend".to_string();
                item
            })
            .collect()
    }

    fn engine() -> (Arc<MemoryBackend>, ReconciliationEngine<TechStatus>) {
        let store = Arc::new(MemoryBackend::new());
        let engine = ReconciliationEngine::open(store.clone(), KEY);
        (store, engine)
    }

    #[test]
    fn test_overlay_wins_for_editable_fields() {
        let mut overlay = Overlay::new();
        overlay.insert(
            "a1".to_string(),
            OverlayRecord {
                status: Some(TechStatus::Completed),
                notes: "done".to_string(),
                ..OverlayRecord::default()
            },
        );
        let mut items = remote(&["a1"]);
        items[0].title = "Remote title".to_string();

        let merged = merge(&items, &overlay);
        assert_eq!(merged[0].status, TechStatus::Completed);
        assert_eq!(merged[0].notes, "done");
        assert_eq!(merged[0].title, "Remote title");
    }

    #[test]
    fn test_empty_overlay_notes_fall_back_to_remote() {
        let mut overlay = Overlay::new();
        overlay.insert("a1".to_string(), OverlayRecord::default());
        let mut items = remote(&["a1"]);
        items[0].notes = "from source".to_string();
        items[0].deadline = NaiveDate::from_ymd_opt(2025, 7, 1);

        let merged = merge(&items, &overlay);
        assert_eq!(merged[0].notes, "from source");
        assert_eq!(merged[0].deadline, NaiveDate::from_ymd_opt(2025, 7, 1));
        assert_eq!(merged[0].status, TechStatus::NotStarted);
    }

    #[test]
    fn test_overlay_schedule_wins_over_differing_remote() {
        let completed_at = chrono::DateTime::parse_from_rfc3339("2026-01-02T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let mut overlay = Overlay::new();
        overlay.insert(
            "a1".to_string(),
            OverlayRecord {
                deadline: NaiveDate::from_ymd_opt(2026, 1, 1),
                estimated_hours: Some(5),
                completed_at: Some(completed_at),
                ..OverlayRecord::default()
            },
        );
        let mut items = remote(&["a1"]);
        items[0].deadline = NaiveDate::from_ymd_opt(2030, 1, 1);
        items[0].estimated_hours = Some(99);
        items[0].completed_at = Some(chrono::Utc::now());

        let merged = merge(&items, &overlay);
        assert_eq!(merged[0].deadline, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert_eq!(merged[0].estimated_hours, Some(5));
        assert_eq!(merged[0].completed_at, Some(completed_at));
    }

    #[test]
    fn test_merge_preserves_remote_order_and_drops_overlay_only() {
        let mut overlay = Overlay::new();
        write_back(&mut overlay, &remote(&["zz", "b"]));

        let merged = merge(&remote(&["c", "b", "a"]), &overlay);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_merge_is_idempotent_through_write_back() {
        let mut overlay = Overlay::new();
        overlay.insert(
            "a".to_string(),
            OverlayRecord {
                status: Some(TechStatus::InProgress),
                estimated_hours: Some(12),
                ..OverlayRecord::default()
            },
        );
        let items = remote(&["a", "b"]);

        let once = merge(&items, &overlay);
        let mut folded = overlay.clone();
        write_back(&mut folded, &once);
        let twice = merge(&items, &folded);
        assert_eq!(once, twice);

        let mut folded_again = folded.clone();
        write_back(&mut folded_again, &twice);
        assert_eq!(folded, folded_again);
    }

    #[test]
    fn test_edits_survive_refetch_and_roadmap_switch() {
        let (store, mut engine) = engine();
        engine.apply_remote(&remote(&["a1", "a2"]));
        engine.set_status("a1", TechStatus::Completed);
        engine.set_notes("a2", "halfway");

        // Another roadmap, then back again, then a fresh process
        engine.apply_remote(&remote(&["b1"]));
        assert_eq!(engine.items().len(), 1);

        let mut reopened = ReconciliationEngine::<TechStatus>::open(store, KEY);
        reopened.apply_remote(&remote(&["a1", "a2"]));
        assert_eq!(reopened.items()[0].status, TechStatus::Completed);
        assert_eq!(reopened.items()[1].notes, "halfway");
        assert!(reopened.overlay().contains_key("b1"));
    }

    #[test]
    fn test_normalized_scenario() {
        let (store, _) = engine();
        store
            .set(KEY, &json!({ "a1": { "status": "completed", "notes": "done" } }))
            .unwrap();
        let mut engine = ReconciliationEngine::<TechStatus>::open(store, KEY);

        let items: Vec<Item<TechStatus>> =
            normalize(&json!([{ "id": "a1", "state": "not-started", "note": "" }]), "X");
        let merged = engine.apply_remote(&items);
        assert_eq!(merged[0].status, TechStatus::Completed);
        assert_eq!(merged[0].notes, "done");
    }

    #[test]
    fn test_mutations_write_through() {
        let (store, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        engine.update_item(
            "a1",
            &ItemPatch {
                deadline: Some(NaiveDate::from_ymd_opt(2025, 12, 31)),
                estimated_hours: Some(Some(40)),
                ..ItemPatch::default()
            },
        );

        let stored = store.get(KEY).unwrap().unwrap();
        assert_eq!(stored["a1"]["deadline"], "2025-12-31");
        assert_eq!(stored["a1"]["estimatedHours"], 40);
    }

    #[test]
    fn test_first_completion_survives_reopen_cycle() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));

        engine.set_status("a1", TechStatus::Completed);
        let first = engine.working_set().get("a1").unwrap().completed_at;
        assert!(first.is_some());

        engine.set_status("a1", TechStatus::InProgress);
        engine.set_status("a1", TechStatus::Completed);
        assert_eq!(engine.working_set().get("a1").unwrap().completed_at, first);
    }

    #[test]
    fn test_transition_to_current_status_is_a_no_op() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        engine.set_status("a1", TechStatus::Completed);
        let stamped = engine.working_set().get("a1").unwrap().completed_at;

        let after = engine.transition("a1", TechStatus::Completed).unwrap();
        assert_eq!(after[0].status, TechStatus::Completed);
        assert_eq!(after[0].completed_at, stamped);
    }

    #[test]
    fn test_bulk_set_status_scenario() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        let result = engine.bulk_set_status(["a1", "zz"], TechStatus::Completed);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status, TechStatus::Completed);
    }

    #[test]
    fn test_reset_all_clears_notes_and_deadline() {
        let (_, mut engine) = engine();
        let mut items = remote(&["a1"]);
        items[0].notes = "remote".to_string();
        engine.apply_remote(&items);
        engine.set_notes("a1", "mine");
        engine.complete_all();

        let after = engine.reset_all();
        assert_eq!(after[0].status, TechStatus::NotStarted);
        assert_eq!(after[0].notes, "");
        assert_eq!(after[0].completed_at, None);
    }

    #[test]
    fn test_pick_random_exhaustion_leaves_working_set() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1", "a2"]));
        engine.complete_all();
        let before = engine.working_set().clone();

        let mut rng = StdRng::seed_from_u64(3);
        assert!(engine.pick_random_with(&mut rng).is_none());
        assert_eq!(engine.items(), before.items());
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_mutations() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        let snapshot = engine.working_set().clone();
        engine.set_status("a1", TechStatus::InProgress);
        assert_eq!(snapshot[0].status, TechStatus::NotStarted);
    }

    #[test]
    fn test_add_item_appends() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        let added = engine.add_item(NewItem {
            title: "WebAssembly".to_string(),
            description: "Compile Rust for the browser".to_string(),
            ..NewItem::default()
        });
        assert_eq!(engine.items().last().map(|i| i.id.as_str()), Some(added.id.as_str()));
        assert!(engine.overlay().contains_key(&added.id));
    }

    #[test]
    fn test_import_is_atomic() {
        let (store, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        let before = engine.working_set().clone();
        let stored_before = store.get(KEY).unwrap();

        let mut batch = remote(&["n1", "n2", "n3", "n4", "n5"]);
        for item in &mut batch {
            item.description = "filled".to_string();
        }
        batch[2].description.clear();

        assert!(engine.import_replace(batch).is_err());
        assert_eq!(engine.items(), before.items());
        assert_eq!(store.get(KEY).unwrap(), stored_before);
    }

    #[test]
    fn test_import_replaces_overlay_wholesale() {
        let (_, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));

        let mut batch = remote(&["n1"]);
        batch[0].description = "imported".to_string();
        engine.import_replace(batch).unwrap();

        assert_eq!(engine.working_set().ids(), vec!["n1"]);
        assert_eq!(engine.overlay().keys().collect::<Vec<_>>(), vec!["n1"]);
    }

    #[test]
    fn test_unreadable_overlay_records_are_kept() {
        let store = Arc::new(MemoryBackend::new());
        store
            .set(
                KEY,
                &json!({
                    "stage-item": { "status": "planned", "notes": "keep me", "deadline": "2026-03-01" },
                    "b": { "status": "completed" }
                }),
            )
            .unwrap();
        let mut engine = ReconciliationEngine::<TechStatus>::open(store.clone(), KEY);
        assert_eq!(engine.overlay().len(), 1);
        assert!(engine.overlay().contains_key("b"));

        engine.apply_remote(&remote(&["b"]));
        engine.set_notes("b", "edited");

        let stored = store.get(KEY).unwrap().unwrap();
        assert_eq!(stored["stage-item"]["status"], "planned");
        assert_eq!(stored["stage-item"]["notes"], "keep me");
        assert_eq!(stored["b"]["notes"], "edited");
    }

    #[test]
    fn test_rewritten_record_replaces_unreadable_one() {
        let store = Arc::new(MemoryBackend::new());
        store
            .set(KEY, &json!({ "a1": { "status": "blocked", "notes": "old" } }))
            .unwrap();
        let mut engine = ReconciliationEngine::<TechStatus>::open(store.clone(), KEY);

        engine.apply_remote(&remote(&["a1"]));
        let stored = store.get(KEY).unwrap().unwrap();
        assert_eq!(stored["a1"]["status"], "not-started");
    }

    #[test]
    fn test_malformed_overlay_is_not_overwritten() {
        let store = Arc::new(MemoryBackend::new());
        store.set(KEY, &json!(["not", "an", "object"])).unwrap();
        let mut engine = ReconciliationEngine::<TechStatus>::open(store.clone(), KEY);
        assert!(!engine.is_writable());

        engine.apply_remote(&remote(&["a1"]));
        engine.set_status("a1", TechStatus::Completed);
        assert_eq!(engine.items()[0].status, TechStatus::Completed);
        assert_eq!(store.get(KEY).unwrap(), Some(json!(["not", "an", "object"])));

        // An explicit clear makes the overlay writable again
        engine.clear_overlay();
        engine.set_notes("a1", "fresh");
        assert!(engine.is_writable());
        assert_eq!(store.get(KEY).unwrap().unwrap()["a1"]["notes"], "fresh");
    }

    #[test]
    fn test_clear_overlay() {
        let (store, mut engine) = engine();
        engine.apply_remote(&remote(&["a1"]));
        engine.clear_overlay();
        assert!(engine.overlay().is_empty());
        assert_eq!(store.get(KEY).unwrap(), None);
        assert_eq!(engine.items().len(), 1);
    }
}
