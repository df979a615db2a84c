pub mod api;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod flow;
pub mod picker;
pub mod recording;
pub mod state;

use state::AppState;
use std::sync::Arc;

/// Start the flow runner: load configuration and serve the editor API until shutdown.
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration (never overwrite existing file on failure)
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}. Using in-memory defaults (not saving).", e);
            config::AppConfig::default()
        }
    };

    let api = config.api.clone();
    let state = Arc::new(AppState::new(config));

    if !api.enabled || api.port == 0 {
        tracing::warn!("Flow API disabled in config, nothing to serve");
        return Ok(());
    }

    let server_state = Arc::clone(&state);
    let server = tokio::spawn(async move {
        api::run_server(server_state, api.port, api.api_key).await
    });

    tokio::select! {
        result = server => {
            result?.map_err(anyhow::Error::msg)?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    // Leave no Chrome behind
    state.controller.stop_flow().await;
    Ok(())
}
