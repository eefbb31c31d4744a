//! Error types shared across the tracker
//!
//! Fetch failures are surfaced as a visible, non-fatal state by the session;
//! import failures abort the whole import before anything is written.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while fetching, importing or transitioning items
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("request to {endpoint} failed: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("{endpoint} responded with HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("{endpoint} returned malformed JSON: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("no roadmaps available")]
    NoRoadmaps,

    #[error("import rejected: {0}")]
    Validation(#[from] ImportRejected),

    #[error("cannot move item {id} from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl TrackerError {
    /// True for failures of the remote roadmap source
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            TrackerError::Network { .. }
                | TrackerError::HttpStatus { .. }
                | TrackerError::MalformedResponse { .. }
                | TrackerError::NoRoadmaps
        )
    }
}

/// One problem found in an import batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIssue {
    /// Zero-based position of the offending record, `None` for batch-level problems
    pub index: Option<usize>,
    pub reason: String,
}

impl ImportIssue {
    pub fn batch(reason: impl Into<String>) -> Self {
        Self {
            index: None,
            reason: reason.into(),
        }
    }

    pub fn record(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "record {}: {}", index + 1, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// An import batch that failed validation as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRejected {
    pub issues: Vec<ImportIssue>,
}

impl fmt::Display for ImportRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details: Vec<String> = self.issues.iter().map(|issue| issue.to_string()).collect();
        write!(f, "{}", details.join("; "))
    }
}

impl std::error::Error for ImportRejected {}
