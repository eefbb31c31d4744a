pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod storage;
pub mod track;
pub mod transitions;
pub mod views;

// Re-export commonly used types
pub use catalog::{default_catalog, LocalCatalog, TrackPreference, TrackSource};
pub use config::{get_config_path, TrackerConfig};
pub use db::{create_backend, BackendType, KeyValueStore};
pub use engine::{merge, write_back, ReconciliationEngine};
pub use error::{ImportIssue, ImportRejected, TrackerError};
pub use fetch::{Applied, FetchRequest, FetchState, RoadmapSession, StoreKeys};
pub use models::{
    validate_schedule, Item, ItemPatch, Link, NewItem, Overlay, OverlayRecord, Priority, Roadmap,
    StageStatus, StatusModel, TechStatus, WorkflowStatus, WorkingSet,
};
pub use normalize::normalize;
pub use remote::{HttpRoadmapSource, RoadmapSource};
pub use storage::Storage;
pub use track::Track;
pub use views::{filter_items, upcoming_deadlines, Progress, StatusBreakdown, StatusFilter};
