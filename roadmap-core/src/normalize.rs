//! Roadmap normalizer
//!
//! The roadmap service answers with one of three payload shapes: a bare
//! array of items, an object with an `items` array, or an object keyed by
//! item id. [`RawRoadmap::classify`] decodes the shape once and
//! [`normalize`] turns any of them into a flat, ordered list of items.
//! Anything unrecognized degrades to an empty list; nothing here fails.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::models::{Item, Link, WorkflowStatus};

/// Title given to remote items that arrive without one
pub const UNTITLED: &str = "Untitled";

/// Category used when neither the payload nor the roadmap list names one
pub const DEFAULT_CATEGORY: &str = "general";

/// The recognized shapes of a roadmap payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawRoadmap<'a> {
    /// `[ {...}, {...} ]`
    List(&'a [Value]),
    /// `{ "title": ..., "items": [ {...} ] }`
    Wrapped(&'a [Value]),
    /// `{ "a1": {...}, "a2": {...} }`
    Keyed(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> RawRoadmap<'a> {
    /// Detects the payload shape, checking list, wrapped and keyed in that order
    pub fn classify(raw: &'a Value) -> Self {
        match raw {
            Value::Array(items) => RawRoadmap::List(items),
            Value::Object(map) => match map.get("items") {
                Some(Value::Array(items)) => RawRoadmap::Wrapped(items),
                _ => RawRoadmap::Keyed(map),
            },
            _ => RawRoadmap::Unrecognized,
        }
    }
}

/// The roadmap's own title, when the payload carries one
pub fn payload_title(raw: &Value) -> Option<&str> {
    raw.get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
}

/// Converts any roadmap payload into an ordered list of items.
///
/// Ids repeated within the payload keep their first occurrence only.
pub fn normalize<S: WorkflowStatus>(raw: &Value, roadmap_title: &str) -> Vec<Item<S>> {
    let entries: Vec<(Option<String>, &Map<String, Value>)> = match RawRoadmap::classify(raw) {
        RawRoadmap::List(items) | RawRoadmap::Wrapped(items) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| (None, obj))
            .collect(),
        RawRoadmap::Keyed(map) => map
            .iter()
            .filter_map(|(key, value)| value.as_object().map(|obj| (Some(key.clone()), obj)))
            .collect(),
        RawRoadmap::Unrecognized => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(entries.len());
    for (index, (key, obj)) in entries.into_iter().enumerate() {
        let item = map_item(key, obj, index, roadmap_title);
        if seen.insert(item.id.clone()) {
            items.push(item);
        }
    }
    items
}

fn map_item<S: WorkflowStatus>(
    key: Option<String>,
    obj: &Map<String, Value>,
    index: usize,
    roadmap_title: &str,
) -> Item<S> {
    let id = key
        .or_else(|| obj.get("id").and_then(stringify_id))
        .unwrap_or_else(|| format!("{}#{}", roadmap_title, index));

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNTITLED);

    let mut item = Item::new(id, title);
    item.description = string_field(obj, "description");
    item.status = obj
        .get("state")
        .and_then(Value::as_str)
        .and_then(S::parse)
        .unwrap_or_else(S::initial);
    item.notes = string_field(obj, "note");
    item.deadline = obj.get("deadline").and_then(parse_deadline);
    item.resources = obj.get("links").map(parse_links).unwrap_or_default();
    item.category = roadmap_title.to_string();
    item
}

fn string_field(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Stringifies a string or numeric id; anything else is treated as absent
pub(crate) fn stringify_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a deadline given as `YYYY-MM-DD`, an RFC 3339 timestamp, or epoch milliseconds
pub(crate) fn parse_deadline(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Reads a links array made of plain URLs or `{url|href, title}` objects
pub(crate) fn parse_links(value: &Value) -> Vec<Link> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(url) if !url.is_empty() => Some(Link::new(url.clone())),
            Value::Object(obj) => {
                let url = obj
                    .get("url")
                    .or_else(|| obj.get("href"))
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())?;
                Some(Link {
                    url: url.to_string(),
                    title: obj.get("title").and_then(Value::as_str).map(str::to_string),
                })
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StageStatus, TechStatus};
    use serde_json::json;

    #[test]
    fn test_keyed_payload() {
        let raw = json!({ "a1": { "title": "X", "state": "in-progress" } });
        let items: Vec<Item<TechStatus>> = normalize(&raw, "Frontend");

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "a1");
        assert_eq!(item.title, "X");
        assert_eq!(item.status, TechStatus::InProgress);
        assert_eq!(item.category, "Frontend");
        assert_eq!(item.description, "");
        assert_eq!(item.notes, "");
        assert!(item.resources.is_empty());
    }

    #[test]
    fn test_array_payload_keeps_order_and_stringifies_ids() {
        let raw = json!([
            { "id": 7, "title": "Seven" },
            { "id": "b", "title": "Bee", "note": "remote note" },
        ]);
        let items: Vec<Item<TechStatus>> = normalize(&raw, "Backend");

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["7", "b"]);
        assert_eq!(items[1].notes, "remote note");
        assert_eq!(items[0].status, TechStatus::NotStarted);
    }

    #[test]
    fn test_wrapped_payload_wins_over_keyed() {
        let raw = json!({
            "title": "DevOps",
            "items": [ { "id": "d1", "title": "Docker" } ]
        });
        assert!(matches!(RawRoadmap::classify(&raw), RawRoadmap::Wrapped(_)));
        assert_eq!(payload_title(&raw), Some("DevOps"));

        let items: Vec<Item<TechStatus>> = normalize(&raw, "DevOps");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "d1");
    }

    #[test]
    fn test_keyed_payload_skips_scalar_metadata() {
        let raw = json!({ "title": "Mobile", "m1": { "title": "Kotlin" } });
        let items: Vec<Item<TechStatus>> = normalize(&raw, "Mobile");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "m1");
    }

    #[test]
    fn test_unrecognized_shapes_yield_nothing() {
        for raw in [json!(null), json!(42), json!("roadmap"), json!(true)] {
            let items: Vec<Item<TechStatus>> = normalize(&raw, "X");
            assert!(items.is_empty());
        }
    }

    #[test]
    fn test_field_defaults_and_parsing() {
        let raw = json!([{
            "title": "",
            "state": "bogus",
            "deadline": "2025-06-30T10:00:00Z",
            "links": ["https://doc.rust-lang.org", { "href": "https://tokio.rs", "title": "Tokio" }, 5]
        }]);
        let items: Vec<Item<TechStatus>> = normalize(&raw, "Rust");
        let item = &items[0];

        assert_eq!(item.id, "Rust#0");
        assert_eq!(item.title, UNTITLED);
        assert_eq!(item.status, TechStatus::NotStarted);
        assert_eq!(item.deadline, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(item.resources.len(), 2);
        assert_eq!(item.resources[1].title.as_deref(), Some("Tokio"));
    }

    #[test]
    fn test_synthesized_ids_are_stable() {
        let raw = json!([{ "title": "A" }, { "title": "B" }]);
        let first: Vec<Item<TechStatus>> = normalize(&raw, "Web");
        let second: Vec<Item<TechStatus>> = normalize(&raw, "Web");
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let raw = json!([
            { "id": "x", "title": "First" },
            { "id": "x", "title": "Second" },
        ]);
        let items: Vec<Item<TechStatus>> = normalize(&raw, "Dup");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "First");
    }

    #[test]
    fn test_stage_workflow_reads_its_own_states() {
        let raw = json!([{ "id": "s1", "title": "Schema", "state": "blocked" }]);
        let items: Vec<Item<StageStatus>> = normalize(&raw, "DB");
        assert_eq!(items[0].status, StageStatus::Blocked);

        let items: Vec<Item<TechStatus>> = normalize(&raw, "DB");
        assert_eq!(items[0].status, TechStatus::NotStarted);
    }

    #[test]
    fn test_epoch_millis_deadline() {
        assert_eq!(
            parse_deadline(&json!(1_735_689_600_000_i64)),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
        assert_eq!(parse_deadline(&json!("next week")), None);
    }
}
