use anyhow::Result;
use clap::Parser;
use export_relay::{audit, config, export, producer, queue, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let audit_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.audit_database_url());
    let audit = audit::AuditLog::new(cfg.audit.enabled, audit_url);

    let queue_client = Arc::new(queue::LazyTasksClient::new(&cfg.queue));
    let target = producer::QueueTarget::from_config(&cfg.queue);
    let exporter = Arc::new(export::Exporter::new(queue_client, target, audit));

    let state = server::AppState {
        exporter,
        max_batch_items: cfg.app.max_batch_items,
    };
    let app = server::router(state, cfg.app.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, queue = %cfg.queue.queue, "starting export relay");
    axum::serve(listener, app).await?;

    Ok(())
}
