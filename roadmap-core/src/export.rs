//! JSON export and validated import of working sets
//!
//! An import batch is accepted or rejected as a whole. Every problem found
//! is collected so the user can fix the file in one pass.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ImportIssue, ImportRejected, TrackerError};
use crate::models::{Item, Priority, WorkflowStatus, MAX_ESTIMATED_HOURS};
use crate::normalize::{parse_deadline, parse_links, stringify_id};

/// Category given to imported records that carry none
pub const IMPORT_CATEGORY: &str = "other";

/// Default export file name for `date`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("roadmap-{}.json", date.format("%Y-%m-%d"))
}

/// Serializes items as a pretty-printed JSON array
pub fn export_json<S: WorkflowStatus>(items: &[Item<S>]) -> Result<String> {
    serde_json::to_string_pretty(items).context("Failed to serialize items")
}

pub fn write_export<S: WorkflowStatus, P: AsRef<Path>>(path: P, items: &[Item<S>]) -> Result<()> {
    let path = path.as_ref();
    let json = export_json(items)?;
    fs::write(path, json).with_context(|| format!("Failed to write export to {:?}", path))
}

/// Checks the invariants every item of a working set must hold
pub fn validate_items<S: WorkflowStatus>(items: &[Item<S>]) -> Result<(), ImportRejected> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        if item.id.trim().is_empty() {
            issues.push(ImportIssue::record(index, "id is empty"));
        } else if !seen.insert(item.id.as_str()) {
            issues.push(ImportIssue::record(index, format!("duplicate id {}", item.id)));
        }
        if item.title.trim().is_empty() {
            issues.push(ImportIssue::record(index, "title is empty"));
        }
        if item.description.trim().is_empty() {
            issues.push(ImportIssue::record(index, "description is empty"));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ImportRejected { issues })
    }
}

/// Parses an exported JSON document into items for the active workflow.
///
/// Missing optional fields are filled in; any invalid record rejects the
/// whole batch.
pub fn parse_import<S: WorkflowStatus>(json: &str) -> Result<Vec<Item<S>>, TrackerError> {
    let reject = |reason: String| TrackerError::from(ImportRejected {
        issues: vec![ImportIssue::batch(reason)],
    });

    let value: Value =
        serde_json::from_str(json).map_err(|e| reject(format!("not valid JSON: {}", e)))?;
    let Value::Array(records) = value else {
        return Err(reject("expected a JSON array of items".to_string()));
    };

    let mut items = Vec::with_capacity(records.len());
    let mut issues = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match record.as_object() {
            Some(obj) => match import_record(obj) {
                Ok(item) => items.push(item),
                Err(reasons) => issues.extend(
                    reasons
                        .into_iter()
                        .map(|reason| ImportIssue::record(index, reason)),
                ),
            },
            None => issues.push(ImportIssue::record(index, "not an object")),
        }
    }

    if let Err(rejected) = validate_items(&items) {
        // Indices from the second pass only line up when every record parsed
        if issues.is_empty() {
            issues = rejected.issues;
        }
    }

    if issues.is_empty() {
        Ok(items)
    } else {
        Err(ImportRejected { issues }.into())
    }
}

fn import_record<S: WorkflowStatus>(obj: &Map<String, Value>) -> Result<Item<S>, Vec<String>> {
    let mut reasons = Vec::new();

    let title = non_empty_str(obj, "title");
    if title.is_none() {
        reasons.push("title is missing or empty".to_string());
    }
    let description = non_empty_str(obj, "description");
    if description.is_none() {
        reasons.push("description is missing or empty".to_string());
    }

    let status = match obj.get("status").and_then(Value::as_str) {
        Some(raw) => match S::parse(raw) {
            Some(status) => Some(status),
            None => {
                reasons.push(format!("status {:?} is not a {} status", raw, S::MODEL));
                None
            }
        },
        None => {
            reasons.push("status is missing".to_string());
            None
        }
    };

    let estimated_hours = match obj.get("estimatedHours") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_u64() {
            Some(hours) if (1..=u64::from(MAX_ESTIMATED_HOURS)).contains(&hours) => {
                Some(hours as u32)
            }
            _ => {
                reasons.push(format!(
                    "estimatedHours must be between 1 and {}",
                    MAX_ESTIMATED_HOURS
                ));
                None
            }
        },
    };

    let (Some(title), Some(description), Some(status)) = (title, description, status) else {
        return Err(reasons);
    };
    if !reasons.is_empty() {
        return Err(reasons);
    }

    let id = obj
        .get("id")
        .and_then(stringify_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut item = Item::new(id, title);
    item.description = description.to_string();
    item.status = status;
    item.notes = obj
        .get("notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    item.deadline = obj.get("deadline").and_then(parse_deadline);
    item.estimated_hours = estimated_hours;
    item.category = non_empty_str(obj, "category")
        .unwrap_or(IMPORT_CATEGORY)
        .to_string();
    item.priority = obj.get("priority").and_then(Value::as_str).and_then(Priority::parse);
    item.resources = obj.get("resources").map(parse_links).unwrap_or_default();
    item.created_at = timestamp(obj, "createdAt");
    item.completed_at = timestamp(obj, "completedAt");
    Ok(item)
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn timestamp(obj: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    let raw = obj.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
