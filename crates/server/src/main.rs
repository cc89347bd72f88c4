mod bootstrap;
mod chat;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use freightdesk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use freightdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let state = chat::AppState {
        runtime: Arc::clone(&app.runtime),
        schema_cache: Arc::clone(&app.schema_cache),
    };
    let router = chat::router(state).merge(health::router(app.pools.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "freightdesk server started"
    );

    let grace_secs = app.config.server.graceful_shutdown_secs;
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(grace_secs))
        .await?;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "freightdesk server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown(grace_secs: u64) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs,
        "shutdown signal received, draining connections"
    );

    // Bound the drain so a hung connection cannot keep the process alive.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(grace_secs)).await;
        tracing::warn!(
            event_name = "system.server.forced_exit",
            correlation_id = "shutdown",
            "drain deadline exceeded, exiting"
        );
        std::process::exit(0);
    });
}
