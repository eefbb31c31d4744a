//! Pure working-set transitions
//!
//! Each function computes a new list from the current one and returns
//! `None` when nothing matched, so callers can skip the swap and the write.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Item, ItemPatch, NewItem, WorkflowStatus};
use crate::normalize::DEFAULT_CATEGORY;

/// How much of an item `reset_all` wipes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Status and completion timestamp only
    StatusOnly,
    /// Also clears notes and deadline
    Full,
}

fn map_matching<S, P, F>(items: &[Item<S>], matches: P, mut update: F) -> Option<Vec<Item<S>>>
where
    S: WorkflowStatus,
    P: Fn(&Item<S>) -> bool,
    F: FnMut(&mut Item<S>),
{
    let mut touched = false;
    let next: Vec<Item<S>> = items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if matches(&item) {
                update(&mut item);
                touched = true;
            }
            item
        })
        .collect();
    touched.then_some(next)
}

pub fn set_status<S: WorkflowStatus>(
    items: &[Item<S>],
    id: &str,
    status: S,
    now: DateTime<Utc>,
) -> Option<Vec<Item<S>>> {
    map_matching(items, |item| item.id == id, |item| item.set_status(status, now))
}

/// Advances the item one step along the workflow cycle
pub fn cycle_status<S: WorkflowStatus>(
    items: &[Item<S>],
    id: &str,
    now: DateTime<Utc>,
) -> Option<Vec<Item<S>>> {
    map_matching(
        items,
        |item| item.id == id,
        |item| {
            let next = item.status.next();
            item.set_status(next, now);
        },
    )
}

pub fn set_notes<S: WorkflowStatus>(
    items: &[Item<S>],
    id: &str,
    notes: &str,
) -> Option<Vec<Item<S>>> {
    map_matching(items, |item| item.id == id, |item| item.notes = notes.to_string())
}

pub fn update_item<S: WorkflowStatus>(
    items: &[Item<S>],
    id: &str,
    patch: &ItemPatch<S>,
    now: DateTime<Utc>,
) -> Option<Vec<Item<S>>> {
    map_matching(items, |item| item.id == id, |item| patch.apply_to(item, now))
}

/// Sets `status` on every listed id; unknown ids are ignored
pub fn bulk_set_status<S: WorkflowStatus>(
    items: &[Item<S>],
    ids: &HashSet<String>,
    status: S,
    now: DateTime<Utc>,
) -> Option<Vec<Item<S>>> {
    map_matching(
        items,
        |item| ids.contains(&item.id),
        |item| item.set_status(status, now),
    )
}

pub fn complete_all<S: WorkflowStatus>(
    items: &[Item<S>],
    now: DateTime<Utc>,
) -> Option<Vec<Item<S>>> {
    map_matching(items, |_| true, |item| item.set_status(S::completed(), now))
}

pub fn reset_all<S: WorkflowStatus>(items: &[Item<S>], scope: ResetScope) -> Option<Vec<Item<S>>> {
    map_matching(
        items,
        |_| true,
        |item| {
            item.status = S::initial();
            item.completed_at = None;
            if scope == ResetScope::Full {
                item.notes.clear();
                item.deadline = None;
            }
        },
    )
}

/// Picks one not-yet-started item uniformly at random and moves it to in-progress.
///
/// Returns the updated list and the picked item (with its new status).
pub fn pick_random<S, R>(
    items: &[Item<S>],
    rng: &mut R,
    now: DateTime<Utc>,
) -> Option<(Vec<Item<S>>, Item<S>)>
where
    S: WorkflowStatus,
    R: Rng + ?Sized,
{
    let candidates: Vec<&Item<S>> = items
        .iter()
        .filter(|item| item.status == S::initial())
        .collect();
    let picked_id = candidates.choose(rng)?.id.clone();

    let next = set_status(items, &picked_id, S::in_progress(), now)?;
    let picked = next.iter().find(|item| item.id == picked_id)?.clone();
    Some((next, picked))
}

/// Builds a locally created item with a fresh id
pub fn new_item<S: WorkflowStatus>(fields: NewItem, now: DateTime<Utc>) -> Item<S> {
    let mut item = Item::new(Uuid::new_v4().to_string(), fields.title);
    item.description = fields.description;
    item.priority = fields.priority;
    item.category = fields
        .category
        .filter(|category| !category.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    item.estimated_hours = fields.estimated_hours;
    item.deadline = fields.deadline;
    item.created_at = Some(now);
    item
}

pub fn append<S: WorkflowStatus>(items: &[Item<S>], item: Item<S>) -> Vec<Item<S>> {
    let mut next = items.to_vec();
    next.push(item);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StageStatus, TechStatus};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap()
    }

    fn sample() -> Vec<Item<TechStatus>> {
        let mut a = Item::new("a1", "Components");
        a.notes = "props".to_string();
        let mut b = Item::new("b2", "Hooks");
        b.status = TechStatus::InProgress;
        let c = Item::new("c3", "Router");
        vec![a, b, c]
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let items = sample();
        assert!(set_status(&items, "zz", TechStatus::Completed, now()).is_none());
        assert!(set_notes(&items, "zz", "x").is_none());
        assert!(update_item(&items, "zz", &ItemPatch::default(), now()).is_none());
    }

    #[test]
    fn test_set_status_only_touches_target() {
        let items = sample();
        let next = set_status(&items, "a1", TechStatus::Completed, now()).unwrap();
        assert_eq!(next[0].status, TechStatus::Completed);
        assert_eq!(next[0].completed_at, Some(now()));
        assert_eq!(next[1], items[1]);
        assert_eq!(next[2], items[2]);
    }

    #[test]
    fn test_bulk_ignores_unknown_and_duplicates() {
        let items = sample();
        let ids: HashSet<String> = ["a1", "zz", "a1"].iter().map(|s| s.to_string()).collect();
        let next = bulk_set_status(&items, &ids, TechStatus::Completed, now()).unwrap();
        assert_eq!(next[0].status, TechStatus::Completed);
        assert_eq!(next[1].status, TechStatus::InProgress);
        assert_eq!(next[2].status, TechStatus::NotStarted);
    }

    #[test]
    fn test_complete_all_keeps_existing_completion_time() {
        let mut items = sample();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        items[1].completed_at = Some(earlier);

        let next = complete_all(&items, now()).unwrap();
        assert!(next.iter().all(|item| item.status == TechStatus::Completed));
        assert_eq!(next[1].completed_at, Some(earlier));
        assert_eq!(next[0].completed_at, Some(now()));
        assert!(complete_all::<TechStatus>(&[], now()).is_none());
    }

    #[test]
    fn test_reset_scopes() {
        let mut items = sample();
        items[0].deadline = chrono::NaiveDate::from_ymd_opt(2025, 9, 1);
        let items = complete_all(&items, now()).unwrap();

        let partial = reset_all(&items, ResetScope::StatusOnly).unwrap();
        assert_eq!(partial[0].notes, "props");
        assert!(partial[0].deadline.is_some());
        assert!(partial.iter().all(|i| i.completed_at.is_none()));

        let full = reset_all(&items, ResetScope::Full).unwrap();
        assert_eq!(full[0].notes, "");
        assert_eq!(full[0].deadline, None);
        assert!(full.iter().all(|i| i.status == TechStatus::NotStarted));
    }

    #[test]
    fn test_reset_uses_workflow_initial_status() {
        let items = vec![Item::<StageStatus> {
            status: StageStatus::Blocked,
            ..Item::new("s1", "Schema")
        }];
        let next = reset_all(&items, ResetScope::StatusOnly).unwrap();
        assert_eq!(next[0].status, StageStatus::Planned);
    }

    #[test]
    fn test_pick_random_only_from_not_started() {
        let items = sample();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let (next, picked) = pick_random(&items, &mut rng, now()).unwrap();
            assert!(picked.id == "a1" || picked.id == "c3");
            assert_eq!(picked.status, TechStatus::InProgress);
            let in_list = next.iter().find(|i| i.id == picked.id).unwrap();
            assert_eq!(in_list.status, TechStatus::InProgress);
        }
    }

    #[test]
    fn test_pick_random_covers_every_candidate() {
        let items = sample();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let (_, picked) = pick_random(&items, &mut rng, now()).unwrap();
            seen.insert(picked.id);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_pick_random_exhausted() {
        let items = complete_all(&sample(), now()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_random(&items, &mut rng, now()).is_none());
    }

    #[test]
    fn test_new_item_defaults() {
        let item: Item<TechStatus> = new_item(
            NewItem {
                title: "Axum".to_string(),
                description: "HTTP services".to_string(),
                category: Some("  ".to_string()),
                ..NewItem::default()
            },
            now(),
        );
        assert_eq!(item.status, TechStatus::NotStarted);
        assert_eq!(item.category, DEFAULT_CATEGORY);
        assert_eq!(item.created_at, Some(now()));
        assert!(Uuid::parse_str(&item.id).is_ok());

        let next = append(&sample(), item.clone());
        assert_eq!(next.last(), Some(&item));
    }
}
