mod chart;
mod client;
mod config;
mod dashboard;
mod devices;
mod error;
mod map;
mod poller;
mod table;
mod ui;
mod web;

use crate::client::BackendClient;
use crate::config::AppConfig;
use crate::dashboard::Dashboard;
use crate::poller::ScanPoller;
use crate::web::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(AppConfig::from_env());

    tracing::info!(
        "Starting wifi-radar on {} (backend: {})",
        config.http_bind,
        config.backend_url
    );

    let client = BackendClient::new(&config.backend_url, config.poll_timeout)
        .with_context(|| format!("Unable to build client for {}", config.backend_url))?;
    let poller = Arc::new(ScanPoller::new(client, Dashboard::new(&config)));

    let poll_task = if config.passive_polling {
        Some(tokio::spawn(Arc::clone(&poller).run(config.poll_interval)))
    } else {
        tracing::info!("Passive polling disabled, waiting for scan requests");
        None
    };

    let state = AppState {
        config: config.clone(),
        poller,
    };

    web::serve(state).await?;

    if let Some(task) = poll_task {
        task.abort();
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
