use std::sync::Arc;

use anyhow::Context;

use omiesync_api::app::{build_app, services::build_services};
use omiesync_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    omiesync_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        source = ?config.source,
        dry_run = config.omie.dry_run,
        interval_ms = config.dispatcher.interval.as_millis() as u64,
        concurrency = config.dispatcher.concurrency,
        max_attempts = config.dispatcher.retry.max_attempts,
        "configuration loaded"
    );

    let services = build_services(&config).context("failed to wire services")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
