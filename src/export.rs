//! Coordinates batch submission: enqueue first, audit after.
use crate::audit::AuditLog;
use crate::model::{Batch, EventKind, ExportEvent, WorkItem};
use crate::producer::{self, QueueTarget};
use crate::queue::{TaskCreationError, TaskQueue};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("batch must contain at least one work item")]
    EmptyBatch,
    #[error("failed to enqueue batch: {0}")]
    Enqueue(#[from] TaskCreationError),
    /// A later batch failed after earlier ones were already enqueued. The
    /// enqueued task names are carried so callers do not re-submit those
    /// batches on retry.
    #[error("enqueued {} of {total} batches before enqueue failed: {source}", .enqueued.len())]
    Partial {
        enqueued: Vec<String>,
        total: usize,
        #[source]
        source: TaskCreationError,
    },
}

pub struct Exporter {
    queue: Arc<dyn TaskQueue>,
    target: QueueTarget,
    audit: AuditLog,
}

impl Exporter {
    pub fn new(queue: Arc<dyn TaskQueue>, target: QueueTarget, audit: AuditLog) -> Self {
        Self {
            queue,
            target,
            audit,
        }
    }

    /// Submit one batch for `job_id` and return the queue-assigned task name.
    ///
    /// The enqueue completes (success or failure) before any audit event is
    /// appended, so `submitted` is never recorded for a task that does not
    /// exist in the queue. A batch either fully enqueues or fully fails;
    /// enqueue failures are audited and re-raised, audit failures are not
    /// the caller's problem.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn submit_batch(&self, job_id: &str, batch: &Batch) -> Result<String, ExportError> {
        if batch.is_empty() {
            return Err(ExportError::EmptyBatch);
        }

        match producer::create_batch_task(self.queue.as_ref(), &self.target, batch).await {
            Ok(task_name) => {
                self.audit
                    .append(&ExportEvent {
                        job_id: job_id.to_string(),
                        kind: EventKind::Submitted,
                        timestamp: Utc::now(),
                        detail: Some(task_name.clone()),
                    })
                    .await;
                info!(task = %task_name, items = batch.len(), "batch enqueued");
                Ok(task_name)
            }
            Err(err) => {
                self.audit
                    .append(&ExportEvent {
                        job_id: job_id.to_string(),
                        kind: EventKind::EnqueueFailed,
                        timestamp: Utc::now(),
                        detail: Some(err.to_string()),
                    })
                    .await;
                warn!(?err, items = batch.len(), "batch enqueue failed");
                Err(ExportError::Enqueue(err))
            }
        }
    }

    /// Split a flat item list into batches of at most `max_batch_items` and
    /// submit them in order. Stops at the first enqueue failure; batches
    /// enqueued before the failure stay enqueued and keep their audit
    /// events, and the returned [`ExportError::Partial`] names them.
    pub async fn submit_items(
        &self,
        job_id: &str,
        items: Vec<WorkItem>,
        max_batch_items: usize,
    ) -> Result<Vec<String>, ExportError> {
        if items.is_empty() {
            return Err(ExportError::EmptyBatch);
        }

        let chunks: Vec<_> = items.chunks(max_batch_items.max(1)).collect();
        let total = chunks.len();
        let mut task_names = Vec::new();
        for chunk in chunks {
            let batch = Batch::from(chunk.to_vec());
            match self.submit_batch(job_id, &batch).await {
                Ok(name) => task_names.push(name),
                Err(ExportError::Enqueue(source)) => {
                    warn!(
                        job_id,
                        enqueued = task_names.len(),
                        total,
                        "job submission aborted mid-way"
                    );
                    return Err(ExportError::Partial {
                        enqueued: task_names,
                        total,
                        source,
                    });
                }
                Err(other) => return Err(other),
            }
        }
        Ok(task_names)
    }

    /// Audit timeline for a job, timestamp ascending.
    pub async fn events(&self, job_id: &str) -> Vec<ExportEvent> {
        self.audit.query_by_job(job_id).await
    }
}
