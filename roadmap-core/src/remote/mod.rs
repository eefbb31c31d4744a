//! Remote roadmap source
//!
//! The service wraps every payload in a `{ "response": ... }` envelope.
//! [`RoadmapSource`] hides the transport so the fetch orchestration can be
//! driven by an in-process fake in tests.

mod client;

pub use client::HttpRoadmapSource;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TrackerError;
use crate::models::Roadmap;
use crate::normalize::stringify_id;

/// Read-only access to the roadmap service
#[async_trait]
pub trait RoadmapSource: Send + Sync {
    /// `GET /roadmaps`
    async fn list_roadmaps(&self) -> Result<Vec<Roadmap>, TrackerError>;

    /// `GET /roadmaps/{id}`, returning the unwrapped raw payload
    async fn fetch_roadmap(&self, id: &str) -> Result<Value, TrackerError>;
}

/// Takes the `response` field out of an envelope; a missing field is `null`
pub fn unwrap_envelope(mut body: Value) -> Value {
    body.get_mut("response").map(Value::take).unwrap_or(Value::Null)
}

/// Reads the roadmap list out of an unwrapped `/roadmaps` payload.
///
/// Entries without a usable id are skipped; a missing title falls back to
/// the id.
pub fn parse_roadmap_list(payload: &Value) -> Vec<Roadmap> {
    let Some(entries) = payload.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(stringify_id)?;
            let title = entry
                .get("title")
                .and_then(Value::as_str)
                .filter(|title| !title.trim().is_empty())
                .map_or_else(|| id.clone(), str::to_string);
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Roadmap {
                id,
                title,
                description,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({ "response": [1, 2] })), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!({ "data": [] })), Value::Null);
        assert_eq!(unwrap_envelope(json!([1])), Value::Null);
    }

    #[test]
    fn test_parse_roadmap_list() {
        let payload = json!([
            { "id": "frontend", "title": "Frontend", "description": "Web UI" },
            { "id": 2 },
            { "title": "No id" },
            "junk"
        ]);
        let roadmaps = parse_roadmap_list(&payload);
        assert_eq!(roadmaps.len(), 2);
        assert_eq!(roadmaps[0].description.as_deref(), Some("Web UI"));
        assert_eq!(roadmaps[1].id, "2");
        assert_eq!(roadmaps[1].title, "2");
        assert!(parse_roadmap_list(&json!({})).is_empty());
    }
}
