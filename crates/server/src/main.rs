mod app;
mod bootstrap;
mod chat;
mod health;
mod records;

use std::time::Duration;

use anyhow::{Context, Result};
use crmdesk_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use crmdesk_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "crmdesk-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let routes = app::router(app.db_pool.clone(), app.store.clone(), app.agent_runtime.clone());
    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown(grace)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "crmdesk-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

/// Resolves on ctrl-c, then arms a hard deadline for in-flight streams.
async fn wait_for_shutdown(grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "system.server.draining",
        grace_secs = grace.as_secs(),
        "shutdown requested, draining connections"
    );

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!(
            event_name = "system.server.forced_exit",
            "grace period elapsed with open connections"
        );
        std::process::exit(0);
    });
}
