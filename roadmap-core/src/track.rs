//! Mutation operations shared by both item tracks
//!
//! A track owns a working set and decides how a new working set is made
//! durable. The operations themselves are identical for the remote-backed
//! engine and the local catalog: compute the next list with a pure
//! transition, then hand it to [`Track::commit`], which swaps it in and
//! writes it through.

use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;

use crate::error::TrackerError;
use crate::export::validate_items;
use crate::models::{Item, ItemPatch, NewItem, WorkflowStatus, WorkingSet};
use crate::transitions::{self, ResetScope};
use crate::views::Progress;

pub trait Track<S: WorkflowStatus> {
    /// The current working set
    fn working_set(&self) -> &WorkingSet<S>;

    /// Swaps in `items` as the new working set and persists it
    fn commit(&mut self, items: Vec<Item<S>>);

    /// Replaces the working set and everything persisted for this track
    fn replace_all(&mut self, items: Vec<Item<S>>);

    /// What `reset_all` clears on this track
    fn reset_scope(&self) -> ResetScope;

    fn items(&self) -> &[Item<S>] {
        self.working_set().items()
    }

    fn progress(&self) -> Progress {
        Progress::of(self.items())
    }

    /// Sets the status of one item; unknown ids are ignored
    fn set_status(&mut self, id: &str, status: S) -> &WorkingSet<S> {
        if let Some(next) = transitions::set_status(self.items(), id, status, Utc::now()) {
            self.commit(next);
        }
        self.working_set()
    }

    /// Advances one item along the workflow cycle
    fn cycle_status(&mut self, id: &str) -> &WorkingSet<S> {
        if let Some(next) = transitions::cycle_status(self.items(), id, Utc::now()) {
            self.commit(next);
        }
        self.working_set()
    }

    /// Like `set_status`, but refuses moves the workflow does not allow.
    /// Re-applying the current status is a no-op.
    fn transition(&mut self, id: &str, status: S) -> Result<&WorkingSet<S>, TrackerError> {
        if let Some(current) = self.working_set().get(id).map(|item| item.status) {
            if current == status {
                return Ok(self.working_set());
            }
            if !current.can_transition(status) {
                return Err(TrackerError::InvalidTransition {
                    id: id.to_string(),
                    from: current.to_string(),
                    to: status.to_string(),
                });
            }
        }
        Ok(self.set_status(id, status))
    }

    fn set_notes(&mut self, id: &str, notes: &str) -> &WorkingSet<S> {
        if let Some(next) = transitions::set_notes(self.items(), id, notes) {
            self.commit(next);
        }
        self.working_set()
    }

    /// Shallow-merges `patch` over one item
    fn update_item(&mut self, id: &str, patch: &ItemPatch<S>) -> &WorkingSet<S> {
        if let Some(next) = transitions::update_item(self.items(), id, patch, Utc::now()) {
            self.commit(next);
        }
        self.working_set()
    }

    /// Sets the status of every listed item in a single write
    fn bulk_set_status<I, T>(&mut self, ids: I, status: S) -> &WorkingSet<S>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
        Self: Sized,
    {
        let ids: HashSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        if let Some(next) = transitions::bulk_set_status(self.items(), &ids, status, Utc::now()) {
            self.commit(next);
        }
        self.working_set()
    }

    fn complete_all(&mut self) -> &WorkingSet<S> {
        if let Some(next) = transitions::complete_all(self.items(), Utc::now()) {
            self.commit(next);
        }
        self.working_set()
    }

    fn reset_all(&mut self) -> &WorkingSet<S> {
        if let Some(next) = transitions::reset_all(self.items(), self.reset_scope()) {
            self.commit(next);
        }
        self.working_set()
    }

    /// Starts a random not-yet-started item; `None` when every item is underway
    fn pick_random(&mut self) -> Option<Item<S>>
    where
        Self: Sized,
    {
        self.pick_random_with(&mut rand::thread_rng())
    }

    fn pick_random_with<R>(&mut self, rng: &mut R) -> Option<Item<S>>
    where
        R: Rng + ?Sized,
        Self: Sized,
    {
        let (next, picked) = transitions::pick_random(self.items(), rng, Utc::now())?;
        self.commit(next);
        Some(picked)
    }

    /// Appends a new local item and returns it.
    /// Title and description are expected to be validated by the caller.
    fn add_item(&mut self, fields: NewItem) -> Item<S> {
        let item: Item<S> = transitions::new_item(fields, Utc::now());
        let next = transitions::append(self.items(), item.clone());
        self.commit(next);
        item
    }

    /// Destructively replaces the whole track with `items`.
    ///
    /// The batch is validated first; if any record is invalid nothing changes.
    /// Obtaining the user's consent is the caller's job.
    fn import_replace(&mut self, items: Vec<Item<S>>) -> Result<&WorkingSet<S>, TrackerError> {
        validate_items(&items)?;
        self.replace_all(items);
        Ok(self.working_set())
    }
}
