//! Client adapter for the Cloud Tasks-style queue REST API.
use crate::config;
use crate::model::BatchTask;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Enqueue failure. Always surfaced to the caller so it can tell "batch
/// never queued" apart from "queued, downstream failed".
#[derive(Debug, Error)]
pub enum TaskCreationError {
    #[error("invalid queue API URL: {0}")]
    InvalidUrl(String),
    #[error("failed to encode task body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to reach task queue: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("task queue rejected the task ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Submission seam over the queue service, so tests can substitute a fake
/// without touching global state.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit one task under the fully-qualified queue path and return the
    /// queue-assigned task name.
    async fn create_task(&self, parent: &str, task: &BatchTask)
        -> Result<String, TaskCreationError>;
}

#[derive(Clone)]
pub struct TasksClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl fmt::Debug for TasksClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TasksClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TasksClient {
    pub fn new(api_base: &str, auth_token: Option<String>) -> Result<Self, TaskCreationError> {
        // Url::join drops the last path segment without a trailing slash.
        let normalized = if api_base.ends_with('/') {
            api_base.to_string()
        } else {
            format!("{api_base}/")
        };
        let base_url =
            Url::parse(&normalized).map_err(|e| TaskCreationError::InvalidUrl(e.to_string()))?;
        let http = Client::builder()
            .user_agent("export-relay/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url,
            auth_token,
        })
    }

    pub fn build_request(
        &self,
        parent: &str,
        task: &BatchTask,
    ) -> Result<reqwest::Request, TaskCreationError> {
        let endpoint = self
            .base_url
            .join(&format!("v2/{parent}/tasks"))
            .map_err(|e| TaskCreationError::InvalidUrl(e.to_string()))?;
        let mut builder = self
            .http
            .post(endpoint)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        Ok(builder.json(&json!({ "task": task })).build()?)
    }

    async fn execute_create(&self, request: reqwest::Request) -> Result<String, TaskCreationError> {
        debug!(url = %request.url(), "sending queue request");
        let res = self.http.execute(request).await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TaskCreationError::Rejected { status, body });
        }

        let payload: CreateTaskResponse = res.json().await?;
        Ok(payload.name)
    }
}

#[async_trait]
impl TaskQueue for TasksClient {
    async fn create_task(
        &self,
        parent: &str,
        task: &BatchTask,
    ) -> Result<String, TaskCreationError> {
        let request = self.build_request(parent, task)?;
        self.execute_create(request).await
    }
}

/// Lazily-initialized queue client. The underlying client is built once on
/// first use and the same instance is returned on every later call; an
/// initialization failure propagates to the first operation that needs it.
pub struct LazyTasksClient {
    api_base: String,
    auth_token: Option<String>,
    cell: OnceCell<TasksClient>,
}

impl LazyTasksClient {
    pub fn new(cfg: &config::Queue) -> Self {
        Self {
            api_base: cfg.api_base.clone(),
            auth_token: cfg.auth_token.clone(),
            cell: OnceCell::new(),
        }
    }

    pub fn client(&self) -> Result<&TasksClient, TaskCreationError> {
        self.cell
            .get_or_try_init(|| TasksClient::new(&self.api_base, self.auth_token.clone()))
    }
}

#[async_trait]
impl TaskQueue for LazyTasksClient {
    async fn create_task(
        &self,
        parent: &str,
        task: &BatchTask,
    ) -> Result<String, TaskCreationError> {
        self.client()?.create_task(parent, task).await
    }
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    name: String,
}
