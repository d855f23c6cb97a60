//! Thin HTTP intake in front of the export pipeline.
//!
//! Routing and body parsing only; every decision of consequence lives in
//! [`crate::export`].
use crate::export::{ExportError, Exporter};
use crate::model::{ExportEvent, WorkItem};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    pub max_batch_items: usize,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs/batches", post(submit_new_job))
        .route("/jobs/{job_id}/batches", post(submit))
        .route("/jobs/{job_id}/events", get(events))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
    task_names: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    /// Task names enqueued before a mid-job failure; retrying clients
    /// should skip the batches these cover.
    #[serde(skip_serializing_if = "Option::is_none")]
    enqueued_task_names: Option<Vec<String>>,
}

async fn submit(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(items): Json<Vec<WorkItem>>,
) -> Response {
    submit_items(state, job_id, items).await
}

async fn submit_new_job(
    State(state): State<AppState>,
    Json(items): Json<Vec<WorkItem>>,
) -> Response {
    let job_id = format!("job-{}", Uuid::new_v4());
    submit_items(state, job_id, items).await
}

async fn submit_items(state: AppState, job_id: String, items: Vec<WorkItem>) -> Response {
    match state
        .exporter
        .submit_items(&job_id, items, state.max_batch_items)
        .await
    {
        Ok(task_names) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse { job_id, task_names }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<Vec<ExportEvent>> {
    Json(state.exporter.events(&job_id).await)
}

/// Empty or missing batches are the client's fault; a failed enqueue means
/// the upstream queue let us down.
fn error_response(err: &ExportError) -> Response {
    let status = match err {
        ExportError::EmptyBatch => StatusCode::BAD_REQUEST,
        ExportError::Enqueue(_) | ExportError::Partial { .. } => StatusCode::BAD_GATEWAY,
    };
    let enqueued_task_names = match err {
        ExportError::Partial { enqueued, .. } => Some(enqueued.clone()),
        _ => None,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            enqueued_task_names,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskCreationError;

    #[test]
    fn empty_batch_maps_to_bad_request() {
        let res = error_response(&ExportError::EmptyBatch);
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn enqueue_failure_maps_to_bad_gateway() {
        let err = ExportError::Enqueue(TaskCreationError::Rejected {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "queue down".into(),
        });
        let res = error_response(&err);
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn mid_job_failure_maps_to_bad_gateway() {
        let err = ExportError::Partial {
            enqueued: vec!["tasks/ok".into()],
            total: 3,
            source: TaskCreationError::Rejected {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "queue down".into(),
            },
        };
        let res = error_response(&err);
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
