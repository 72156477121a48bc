mod bootstrap;
mod reply;

use anyhow::Result;
use dingbridge_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use dingbridge_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config, None)?;

    tracing::info!(
        event_name = "system.server.transport_mode",
        transport_mode = app.transport_mode(),
        "stream transport mode initialized"
    );

    let listener = app.listener.clone();
    let pump = tokio::spawn(async move { listener.run().await });

    tracing::info!(event_name = "system.server.started", "dingbridge-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "dingbridge-server stopping");

    if let Err(error) = app.listener.disconnect().await {
        tracing::warn!(
            error_class = dingbridge_core::BridgeError::from(error.clone()).class(),
            error = %error,
            "stream disconnect failed during shutdown"
        );
    }
    pump.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
