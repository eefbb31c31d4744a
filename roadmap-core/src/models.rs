use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

/// Which status workflow a deployment tracks items with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusModel {
    /// not-started / in-progress / completed
    #[default]
    Checklist,
    /// planned / in-progress / blocked / completed
    Stages,
}

impl fmt::Display for StatusModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusModel::Checklist => write!(f, "checklist"),
            StatusModel::Stages => write!(f, "stages"),
        }
    }
}

/// A status state machine an item can move through.
///
/// Every workflow has a starting status, an in-progress status and a
/// completed status; the reconciliation engine and the derived views only
/// rely on these three plus the cycle order.
pub trait WorkflowStatus:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every status of the workflow in display order
    const ALL: &'static [Self];

    /// The configuration value that selects this workflow
    const MODEL: StatusModel;

    /// Status of a freshly created or reset item
    fn initial() -> Self;

    fn in_progress() -> Self;

    fn completed() -> Self;

    /// Next status for the single-click cycle helper
    fn next(self) -> Self;

    /// Whether a manual move from `self` to `to` is allowed
    fn can_transition(self, to: Self) -> bool;

    /// Wire name of the status (e.g. "in-progress")
    fn as_str(self) -> &'static str;

    /// Parses a wire name, accepting `_` for `-` and any letter case
    fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL.iter().copied().find(|status| status.as_str() == wanted)
    }

    fn is_completed(self) -> bool {
        self == Self::completed()
    }
}

/// Status of a technology in the checklist workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TechStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl fmt::Display for TechStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowStatus for TechStatus {
    const ALL: &'static [Self] = &[
        TechStatus::NotStarted,
        TechStatus::InProgress,
        TechStatus::Completed,
    ];
    const MODEL: StatusModel = StatusModel::Checklist;

    fn initial() -> Self {
        TechStatus::NotStarted
    }

    fn in_progress() -> Self {
        TechStatus::InProgress
    }

    fn completed() -> Self {
        TechStatus::Completed
    }

    fn next(self) -> Self {
        match self {
            TechStatus::NotStarted => TechStatus::InProgress,
            TechStatus::InProgress => TechStatus::Completed,
            TechStatus::Completed => TechStatus::NotStarted,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        self != to
    }

    fn as_str(self) -> &'static str {
        match self {
            TechStatus::NotStarted => "not-started",
            TechStatus::InProgress => "in-progress",
            TechStatus::Completed => "completed",
        }
    }
}

/// Status of a stage in the stage-tracker workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Planned,
    InProgress,
    Blocked,
    Completed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkflowStatus for StageStatus {
    const ALL: &'static [Self] = &[
        StageStatus::Planned,
        StageStatus::InProgress,
        StageStatus::Blocked,
        StageStatus::Completed,
    ];
    const MODEL: StatusModel = StatusModel::Stages;

    fn initial() -> Self {
        StageStatus::Planned
    }

    fn in_progress() -> Self {
        StageStatus::InProgress
    }

    fn completed() -> Self {
        StageStatus::Completed
    }

    fn next(self) -> Self {
        match self {
            StageStatus::Planned => StageStatus::InProgress,
            StageStatus::InProgress => StageStatus::Completed,
            StageStatus::Completed => StageStatus::Planned,
            StageStatus::Blocked => StageStatus::InProgress,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use StageStatus::*;
        matches!(
            (self, to),
            (Planned, InProgress)
                | (Planned, Blocked)
                | (InProgress, Completed)
                | (InProgress, Planned)
                | (Completed, InProgress)
                | (Blocked, InProgress)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            StageStatus::Planned => "planned",
            StageStatus::InProgress => "in-progress",
            StageStatus::Blocked => "blocked",
            StageStatus::Completed => "completed",
        }
    }
}

/// Priority of a locally added item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A learning resource attached to an item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

/// A single tracked item (a technology or a roadmap stage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item<S = TechStatus> {
    /// Stable identifier, unique within a working set
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub status: S,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub deadline: Option<NaiveDate>,

    #[serde(default)]
    pub estimated_hours: Option<u32>,

    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub resources: Vec<Link>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Set on the first move into the completed status and kept afterwards
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl<S: WorkflowStatus> Item<S> {
    /// Creates an item in the workflow's initial status with empty optional fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: S::initial(),
            notes: String::new(),
            deadline: None,
            estimated_hours: None,
            category: String::new(),
            priority: None,
            resources: Vec::new(),
            created_at: None,
            completed_at: None,
        }
    }

    /// Changes the status, stamping `completed_at` on the first completion only
    pub fn set_status(&mut self, status: S, now: DateTime<Utc>) {
        self.status = status;
        if status.is_completed() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// The locally editable projection of this item
    pub fn overlay_record(&self) -> OverlayRecord<S> {
        OverlayRecord {
            status: Some(self.status),
            notes: self.notes.clone(),
            deadline: self.deadline,
            estimated_hours: self.estimated_hours,
            completed_at: self.completed_at,
        }
    }
}

/// Sparse record of the fields a user can edit locally, keyed by item id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord<S = TechStatus> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<S>,

    #[serde(default)]
    pub notes: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl<S> Default for OverlayRecord<S> {
    fn default() -> Self {
        Self {
            status: None,
            notes: String::new(),
            deadline: None,
            estimated_hours: None,
            completed_at: None,
        }
    }
}

/// Overlay records keyed by item id
pub type Overlay<S = TechStatus> = BTreeMap<String, OverlayRecord<S>>;

/// A named source of items offered by the remote roadmap service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roadmap {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields accepted by the add-item path
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub estimated_hours: Option<u32>,
    pub deadline: Option<NaiveDate>,
}

/// Partial update applied over an existing item.
///
/// `None` leaves a field untouched; the nested options on clearable fields
/// distinguish "leave alone" from "clear".
#[derive(Debug, Clone)]
pub struct ItemPatch<S = TechStatus> {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<S>,
    pub notes: Option<String>,
    pub deadline: Option<Option<NaiveDate>>,
    pub estimated_hours: Option<Option<u32>>,
    pub category: Option<String>,
    pub priority: Option<Option<Priority>>,
    pub resources: Option<Vec<Link>>,
}

impl<S> Default for ItemPatch<S> {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            status: None,
            notes: None,
            deadline: None,
            estimated_hours: None,
            category: None,
            priority: None,
            resources: None,
        }
    }
}

impl<S: WorkflowStatus> ItemPatch<S> {
    /// Shallow-merges the set fields over `item`
    pub fn apply_to(&self, item: &mut Item<S>, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(status) = self.status {
            item.set_status(status, now);
        }
        if let Some(notes) = &self.notes {
            item.notes = notes.clone();
        }
        if let Some(deadline) = self.deadline {
            item.deadline = deadline;
        }
        if let Some(hours) = self.estimated_hours {
            item.estimated_hours = hours;
        }
        if let Some(category) = &self.category {
            item.category = category.clone();
        }
        if let Some(priority) = self.priority {
            item.priority = priority;
        }
        if let Some(resources) = &self.resources {
            item.resources = resources.clone();
        }
    }
}

/// Upper bound accepted for an hour estimate
pub const MAX_ESTIMATED_HOURS: u32 = 1000;

/// Checks a deadline/estimate pair the way the scheduling form does.
/// Returns the list of problems, empty when the input is acceptable.
pub fn validate_schedule(
    deadline: Option<NaiveDate>,
    estimated_hours: Option<u32>,
    today: NaiveDate,
) -> Vec<String> {
    let mut problems = Vec::new();
    if let Some(date) = deadline {
        if date < today {
            problems.push(format!("deadline {} is in the past", date));
        }
    }
    if let Some(hours) = estimated_hours {
        if hours < 1 {
            problems.push("estimate must be at least 1 hour".to_string());
        } else if hours > MAX_ESTIMATED_HOURS {
            problems.push(format!("estimate cannot exceed {} hours", MAX_ESTIMATED_HOURS));
        }
    }
    problems
}

/// The ordered, merged list of items everything else reads.
///
/// Cloning is cheap; a clone is a stable snapshot that later mutations
/// never alter, because every mutation swaps in a whole new list.
#[derive(Debug, Clone)]
pub struct WorkingSet<S = TechStatus> {
    items: Arc<Vec<Item<S>>>,
}

impl<S> Default for WorkingSet<S> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
        }
    }
}

impl<S: WorkflowStatus> WorkingSet<S> {
    pub fn from_items(items: Vec<Item<S>>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }

    pub fn items(&self) -> &[Item<S>] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Item<S>> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    pub fn to_vec(&self) -> Vec<Item<S>> {
        self.items.as_ref().clone()
    }
}

impl<S> Deref for WorkingSet<S> {
    type Target = [Item<S>];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}
