//! Append-only warehouse for export events.
//!
//! Audit logging is best-effort: a disabled or unreachable warehouse turns
//! `append` into a logged no-op and `query_by_job` into an empty result.
//! Delivery failures never originate here.
use crate::model::{EventKind, ExportEvent};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

pub struct AuditLog {
    enabled: bool,
    database_url: String,
    pool: OnceCell<Option<SqlitePool>>,
}

impl AuditLog {
    pub fn new(enabled: bool, database_url: String) -> Self {
        Self {
            enabled,
            database_url,
            pool: OnceCell::new(),
        }
    }

    /// Store backed by an existing pool; the caller is responsible for
    /// running migrations. Used by tests with in-memory databases.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            enabled: true,
            database_url: String::new(),
            pool: OnceCell::new_with(Some(Some(pool))),
        }
    }

    /// Connects on first use, once per process. A failed connection is
    /// remembered as "unavailable" rather than retried, and is reported via
    /// a warning instead of an error.
    async fn pool(&self) -> Option<&SqlitePool> {
        if !self.enabled {
            return None;
        }
        self.pool
            .get_or_init(|| async {
                match init_pool(&self.database_url).await {
                    Ok(pool) => Some(pool),
                    Err(err) => {
                        warn!(?err, "audit warehouse unavailable; events will be skipped");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Append one export event. Never fails the caller.
    #[instrument(skip_all)]
    pub async fn append(&self, event: &ExportEvent) {
        let Some(pool) = self.pool().await else {
            debug!(job_id = %event.job_id, "audit disabled; skipping event");
            return;
        };
        if let Err(err) = insert_event(pool, event).await {
            warn!(?err, job_id = %event.job_id, "failed to append export event");
        }
    }

    /// All events for a job, timestamp ascending. Empty when the store is
    /// disabled or the job has no events.
    #[instrument(skip_all)]
    pub async fn query_by_job(&self, job_id: &str) -> Vec<ExportEvent> {
        let Some(pool) = self.pool().await else {
            return Vec::new();
        };
        match fetch_events(pool, job_id).await {
            Ok(events) => events,
            Err(err) => {
                warn!(?err, job_id, "failed to query export events");
                Vec::new()
            }
        }
    }
}

pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // SQLite does not create the database file unless asked, and a fresh
    // deployment starts without one.
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn insert_event(pool: &SqlitePool, event: &ExportEvent) -> Result<()> {
    sqlx::query("INSERT INTO export_events (job_id, kind, timestamp, detail) VALUES (?, ?, ?, ?)")
        .bind(&event.job_id)
        .bind(event.kind.as_str())
        .bind(event.timestamp)
        .bind(&event.detail)
        .execute(pool)
        .await?;
    Ok(())
}

async fn fetch_events(pool: &SqlitePool, job_id: &str) -> Result<Vec<ExportEvent>> {
    let rows = sqlx::query(
        "SELECT job_id, kind, timestamp, detail FROM export_events WHERE job_id = ? ORDER BY timestamp ASC, id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let kind_str: String = row.get("kind");
        let Some(kind) = EventKind::parse(&kind_str) else {
            warn!(kind = %kind_str, job_id, "skipping event with unknown kind");
            continue;
        };
        events.push(ExportEvent {
            job_id: row.get("job_id"),
            kind,
            timestamp: row.get::<DateTime<Utc>, _>("timestamp"),
            detail: row.get("detail"),
        });
    }
    Ok(events)
}
