use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One unit of exported work, e.g. a single generated issue.
///
/// The payload keys are sorted by `serde_json::Map`, so serializing the same
/// item always yields the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub id: String,
    pub payload: Map<String, Value>,
}

/// An ordered group of work items submitted to the queue as one task.
/// Serializes as a bare JSON array, matching what the processor endpoint
/// expects as its request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Batch {
    pub items: Vec<WorkItem>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl From<Vec<WorkItem>> for Batch {
    fn from(items: Vec<WorkItem>) -> Self {
        Self { items }
    }
}

/// HTTP task descriptor submitted to the queue service. Field names follow
/// the queue REST API (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    /// Client-assigned task name, set only when deduplication is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub http_request: HttpRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub http_method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Base64-encoded serialized batch.
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    EnqueueFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Submitted => "submitted",
            EventKind::EnqueueFailed => "enqueue_failed",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "submitted" => Some(EventKind::Submitted),
            "enqueue_failed" => Some(EventKind::EnqueueFailed),
            _ => None,
        }
    }
}

/// Immutable audit record for one enqueue attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportEvent {
    pub job_id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str) -> WorkItem {
        let mut payload = Map::new();
        payload.insert("summary".into(), json!("a test case"));
        WorkItem {
            id: id.into(),
            payload,
        }
    }

    #[test]
    fn batch_serializes_as_bare_array() {
        let batch = Batch::from(vec![item("1")]);
        let text = serde_json::to_string(&batch).unwrap();
        assert!(text.starts_with('['), "expected array, got {text}");
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["id"], "1");
    }

    #[test]
    fn event_kind_round_trips() {
        for kind in [EventKind::Submitted, EventKind::EnqueueFailed] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("bogus"), None);
    }

    #[test]
    fn batch_task_omits_unset_name() {
        let task = BatchTask {
            name: None,
            http_request: HttpRequest {
                http_method: "POST".into(),
                url: "https://example.com/process".into(),
                headers: BTreeMap::new(),
                body: "e30=".into(),
            },
        };
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("name").is_none());
        assert_eq!(value["httpRequest"]["httpMethod"], "POST");
    }
}
