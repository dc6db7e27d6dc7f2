mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use finagent_core::config::{AppConfig, LoadOptions};

use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use finagent_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let health = HealthState::new(
        app.runtime.knowledge_responder().retriever_mode(),
        app.config.card_api.base_url.clone(),
    );
    let router = api::app(app.runtime.clone(), health);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "finagent-server started"
    );
    api::serve(
        &app.config.server.bind_address,
        app.config.server.port,
        router,
        Duration::from_secs(app.config.server.graceful_shutdown_secs),
    )
    .await?;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "finagent-server stopped"
    );

    Ok(())
}
