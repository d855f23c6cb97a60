//! Turns batches into queue task descriptors and submits them.
use crate::config;
use crate::model::{Batch, BatchTask, HttpRequest};
use crate::queue::{TaskCreationError, TaskQueue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{debug, info, instrument};

/// Queue location and processor endpoint, resolved from configuration at
/// startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTarget {
    pub project: String,
    pub location: String,
    pub queue: String,
    pub processor_url: String,
    pub dedupe_tasks: bool,
}

impl QueueTarget {
    pub fn from_config(cfg: &config::Queue) -> Self {
        Self {
            project: cfg.project.clone(),
            location: cfg.location.clone(),
            queue: cfg.queue.clone(),
            processor_url: cfg.processor_url.clone(),
            dedupe_tasks: cfg.dedupe_tasks,
        }
    }

    /// Fully-qualified queue path understood by the queue API.
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project, self.location, self.queue
        )
    }
}

/// Build the task descriptor for one batch: HTTP POST to the processor URL
/// with the base64-encoded serialized batch as body. Serialization is
/// deterministic (sorted payload keys), so retrying the same batch produces
/// a byte-identical descriptor.
pub fn build_batch_task(
    target: &QueueTarget,
    batch: &Batch,
) -> Result<BatchTask, TaskCreationError> {
    let body = serde_json::to_vec(batch)?;
    let name = target
        .dedupe_tasks
        .then(|| format!("{}/tasks/{}", target.queue_path(), content_task_id(&body)));

    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    Ok(BatchTask {
        name,
        http_request: HttpRequest {
            http_method: "POST".into(),
            url: target.processor_url.clone(),
            headers,
            body: BASE64.encode(&body),
        },
    })
}

/// Content-derived task id: hex SHA-256 of the serialized batch, truncated.
/// Retries of a byte-identical batch map to the same task name.
fn content_task_id(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    let mut hex = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Submit one batch to the queue. Exactly one task descriptor is sent per
/// call; on failure nothing was accepted by the queue and the error carries
/// the underlying cause.
#[instrument(skip_all)]
pub async fn create_batch_task(
    queue: &dyn TaskQueue,
    target: &QueueTarget,
    batch: &Batch,
) -> Result<String, TaskCreationError> {
    let task = build_batch_task(target, batch)?;
    let parent = target.queue_path();
    debug!(parent = %parent, items = batch.len(), "submitting batch task");
    let name = queue.create_task(&parent, &task).await?;
    info!(task = %name, items = batch.len(), "created batch task");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItem;
    use serde_json::{json, Map};

    fn target() -> QueueTarget {
        QueueTarget {
            project: "proj".into(),
            location: "region".into(),
            queue: "export-queue".into(),
            processor_url: "https://example.com/process-batch".into(),
            dedupe_tasks: false,
        }
    }

    fn batch() -> Batch {
        let mut payload = Map::new();
        payload.insert("summary".into(), json!("login works"));
        payload.insert("priority".into(), json!(2));
        Batch::from(vec![WorkItem {
            id: "tc-1".into(),
            payload,
        }])
    }

    #[test]
    fn queue_path_has_project_location_queue() {
        assert_eq!(
            target().queue_path(),
            "projects/proj/locations/region/queues/export-queue"
        );
    }

    #[test]
    fn task_posts_encoded_batch_to_processor() {
        let task = build_batch_task(&target(), &batch()).unwrap();
        assert_eq!(task.name, None);
        assert_eq!(task.http_request.http_method, "POST");
        assert_eq!(task.http_request.url, "https://example.com/process-batch");
        assert_eq!(
            task.http_request.headers.get("Content-Type").unwrap(),
            "application/json"
        );

        let decoded = BASE64.decode(&task.http_request.body).unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "tc-1");
        assert_eq!(items[0]["payload"]["summary"], "login works");
    }

    #[test]
    fn serialization_is_deterministic() {
        let a = build_batch_task(&target(), &batch()).unwrap();
        let b = build_batch_task(&target(), &batch()).unwrap();
        assert_eq!(a.http_request.body, b.http_request.body);

        // Same fields inserted in a different order still serialize the same.
        let mut payload = Map::new();
        payload.insert("priority".into(), json!(2));
        payload.insert("summary".into(), json!("login works"));
        let reordered = Batch::from(vec![WorkItem {
            id: "tc-1".into(),
            payload,
        }]);
        let c = build_batch_task(&target(), &reordered).unwrap();
        assert_eq!(a.http_request.body, c.http_request.body);
    }

    #[test]
    fn dedupe_names_task_by_content() {
        let mut t = target();
        t.dedupe_tasks = true;

        let a = build_batch_task(&t, &batch()).unwrap();
        let b = build_batch_task(&t, &batch()).unwrap();
        assert_eq!(a.name, b.name);

        let name = a.name.unwrap();
        assert!(name.starts_with("projects/proj/locations/region/queues/export-queue/tasks/"));
        let id = name.rsplit('/').next().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let other = Batch::from(vec![WorkItem {
            id: "tc-2".into(),
            payload: Map::new(),
        }]);
        let c = build_batch_task(&t, &other).unwrap();
        assert_ne!(b.name, c.name);
    }
}
