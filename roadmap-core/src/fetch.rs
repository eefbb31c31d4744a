//! Fetch orchestration
//!
//! A fetch is split in three steps so that only the network wait is
//! asynchronous: [`RoadmapSession::begin`] issues a [`FetchTicket`] stamped
//! with a generation number, [`FetchTicket::run`] talks to the source without
//! borrowing the session, and [`RoadmapSession::complete`] applies the
//! outcome. Completions from a superseded ticket are discarded.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{LocalCatalog, TrackPreference, TrackSource};
use crate::db::{read_json, write_json, KeyValueStore};
use crate::engine::ReconciliationEngine;
use crate::error::TrackerError;
use crate::models::{Roadmap, WorkflowStatus, WorkingSet};
use crate::normalize::{normalize, payload_title, DEFAULT_CATEGORY};
use crate::remote::RoadmapSource;
use crate::track::Track;

/// Where the remote track is in its load cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Idle => write!(f, "idle"),
            FetchState::Loading => write!(f, "loading"),
            FetchState::Ready => write!(f, "ready"),
            FetchState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// What triggered a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// List the roadmaps, then load the remembered one or the first
    Initial,
    /// Load a specific roadmap, keeping the current list (listed first when
    /// nothing has been listed yet)
    Select(String),
    /// Reload the selected roadmap, or behave like `Initial` if none is selected
    Refetch,
}

#[derive(Debug, Clone)]
enum FetchPlan {
    ListThenLoad { preferred: Option<String> },
    ListThenSelect { id: String },
    Load { id: String, entry: Option<Roadmap> },
}

/// A pending fetch, detached from the session that issued it
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    plan: FetchPlan,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self, source: &dyn RoadmapSource) -> FetchOutcome {
        let result = match self.plan {
            FetchPlan::ListThenLoad { preferred } => list_then_load(source, preferred).await,
            FetchPlan::ListThenSelect { id } => list_then_select(source, id).await,
            FetchPlan::Load { id, entry } => source
                .fetch_roadmap(&id)
                .await
                .map(|payload| Fetched {
                    listed: None,
                    id,
                    entry,
                    payload,
                }),
        };
        FetchOutcome {
            generation: self.generation,
            result,
        }
    }
}

async fn list_then_load(
    source: &dyn RoadmapSource,
    preferred: Option<String>,
) -> Result<Fetched, TrackerError> {
    let listed = source.list_roadmaps().await?;
    let entry = preferred
        .and_then(|id| listed.iter().find(|roadmap| roadmap.id == id))
        .or_else(|| listed.first())
        .cloned()
        .ok_or(TrackerError::NoRoadmaps)?;

    let payload = source.fetch_roadmap(&entry.id).await?;
    Ok(Fetched {
        id: entry.id.clone(),
        entry: Some(entry),
        listed: Some(listed),
        payload,
    })
}

async fn list_then_select(source: &dyn RoadmapSource, id: String) -> Result<Fetched, TrackerError> {
    let listed = source.list_roadmaps().await?;
    let entry = listed.iter().find(|roadmap| roadmap.id == id).cloned();
    let payload = source.fetch_roadmap(&id).await?;
    Ok(Fetched {
        listed: Some(listed),
        id,
        entry,
        payload,
    })
}

#[derive(Debug)]
struct Fetched {
    listed: Option<Vec<Roadmap>>,
    id: String,
    entry: Option<Roadmap>,
    payload: Value,
}

/// Result of running a ticket, to be handed back to [`RoadmapSession::complete`]
#[derive(Debug)]
pub struct FetchOutcome {
    generation: u64,
    result: Result<Fetched, TrackerError>,
}

impl FetchOutcome {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What applying an outcome did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Ready { count: usize },
    Failed(String),
    /// A newer ticket was issued after this one; nothing changed
    Stale,
}

/// Store keys used by one deployment; the three must differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub overlay: String,
    pub catalog: String,
    pub selection: String,
}

/// Both item tracks plus the remote fetch state they are read through
pub struct RoadmapSession<S: WorkflowStatus> {
    engine: ReconciliationEngine<S>,
    catalog: LocalCatalog<S>,
    source: Arc<dyn RoadmapSource>,
    store: Arc<dyn KeyValueStore>,
    selection_key: String,
    preference: TrackPreference,
    state: FetchState,
    roadmaps: Vec<Roadmap>,
    selected: Option<Roadmap>,
    remembered: Option<String>,
    latest_generation: u64,
}

impl<S: WorkflowStatus> RoadmapSession<S> {
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        keys: &StoreKeys,
        source: Arc<dyn RoadmapSource>,
        preference: TrackPreference,
    ) -> Self {
        let remembered = match read_json::<String>(store.as_ref(), &keys.selection) {
            Ok(remembered) => remembered,
            Err(e) => {
                warn!(key = %keys.selection, error = %e, "ignoring unreadable roadmap selection");
                None
            }
        };

        Self {
            engine: ReconciliationEngine::open(store.clone(), keys.overlay.clone()),
            catalog: LocalCatalog::open(store.clone(), keys.catalog.clone()),
            source,
            store,
            selection_key: keys.selection.clone(),
            preference,
            state: FetchState::Idle,
            roadmaps: Vec::new(),
            selected: None,
            remembered,
            latest_generation: 0,
        }
    }

    /// Issues a ticket for `request`, superseding any ticket issued before
    pub fn begin(&mut self, request: FetchRequest) -> FetchTicket {
        self.latest_generation += 1;
        self.state = FetchState::Loading;

        let plan = match request {
            FetchRequest::Initial => FetchPlan::ListThenLoad {
                preferred: self.remembered.clone(),
            },
            FetchRequest::Select(id) if self.roadmaps.is_empty() => {
                FetchPlan::ListThenSelect { id }
            }
            FetchRequest::Select(id) => self.load_plan(id),
            FetchRequest::Refetch => match &self.selected {
                Some(selected) => self.load_plan(selected.id.clone()),
                None => FetchPlan::ListThenLoad {
                    preferred: self.remembered.clone(),
                },
            },
        };

        debug!(generation = self.latest_generation, ?plan, "fetch started");
        FetchTicket {
            generation: self.latest_generation,
            plan,
        }
    }

    fn load_plan(&self, id: String) -> FetchPlan {
        let entry = self.roadmaps.iter().find(|roadmap| roadmap.id == id).cloned();
        FetchPlan::Load { id, entry }
    }

    /// Applies a finished fetch.
    ///
    /// On failure the working set, roadmap list and selection are kept.
    pub fn complete(&mut self, outcome: FetchOutcome) -> Applied {
        if outcome.generation != self.latest_generation {
            warn!(
                generation = outcome.generation,
                latest = self.latest_generation,
                "discarding stale fetch result"
            );
            return Applied::Stale;
        }

        match outcome.result {
            Ok(fetched) => {
                let count = self.apply(fetched);
                self.state = FetchState::Ready;
                Applied::Ready { count }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "roadmap fetch failed");
                self.state = FetchState::Error(message.clone());
                Applied::Failed(message)
            }
        }
    }

    fn apply(&mut self, fetched: Fetched) -> usize {
        if let Some(listed) = fetched.listed {
            self.roadmaps = listed;
        }

        let category = payload_title(&fetched.payload)
            .or_else(|| fetched.entry.as_ref().map(|entry| entry.title.as_str()))
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();
        let items = normalize::<S>(&fetched.payload, &category);
        let count = self.engine.apply_remote(&items).len();

        let selected = fetched.entry.unwrap_or_else(|| Roadmap {
            id: fetched.id.clone(),
            title: category,
            description: None,
        });
        info!(roadmap = %selected.id, items = count, "roadmap loaded");

        if self.remembered.as_deref() != Some(selected.id.as_str()) {
            if let Err(e) = write_json(self.store.as_ref(), &self.selection_key, &selected.id) {
                warn!(key = %self.selection_key, error = %e, "failed to remember roadmap selection");
            }
            self.remembered = Some(selected.id.clone());
        }
        self.selected = Some(selected);
        count
    }

    /// Begins, runs and completes a fetch in one call
    pub async fn fetch(&mut self, request: FetchRequest) -> Applied {
        let ticket = self.begin(request);
        let source = self.source.clone();
        let outcome = ticket.run(source.as_ref()).await;
        self.complete(outcome)
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == FetchState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            FetchState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn roadmaps(&self) -> &[Roadmap] {
        &self.roadmaps
    }

    pub fn selected(&self) -> Option<&Roadmap> {
        self.selected.as_ref()
    }

    /// Id of the roadmap loaded last time, even before anything was fetched
    pub fn remembered(&self) -> Option<&str> {
        self.remembered.as_deref()
    }

    pub fn engine(&self) -> &ReconciliationEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReconciliationEngine<S> {
        &mut self.engine
    }

    pub fn catalog(&self) -> &LocalCatalog<S> {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut LocalCatalog<S> {
        &mut self.catalog
    }

    /// Removes every locally stored key: the overlay, the local catalog
    /// (which is reseeded) and the remembered roadmap
    pub fn clear_local_data(&mut self) -> anyhow::Result<()> {
        self.engine.clear_overlay();
        self.catalog.clear()?;
        self.store.remove(&self.selection_key)?;
        self.remembered = None;
        info!("local data cleared");
        Ok(())
    }

    pub fn preference(&self) -> TrackPreference {
        self.preference
    }

    pub fn set_preference(&mut self, preference: TrackPreference) {
        self.preference = preference;
    }

    /// The track reads go to under the current preference
    pub fn active_source(&self) -> TrackSource {
        self.preference.resolve(self.engine.working_set())
    }

    /// Working set of the active track
    pub fn active_items(&self) -> &WorkingSet<S> {
        match self.active_source() {
            TrackSource::RemoteBacked => self.engine.working_set(),
            TrackSource::LocalOnly => self.catalog.working_set(),
        }
    }
}
