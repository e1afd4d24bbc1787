//! telebridge gateway
//!
//! - HTTP updates: POST /update, PUT|POST /params/:name/:value
//! - Reads: GET /params, GET /params/:name
//! - Export to the configured sink: push, timer or collector callback
//! - Graceful shutdown with a final flush

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use telebridge_core::error::{BridgeError, Result};
use telebridge_gateway::{app_state::AppState, config, export, router, shutdown};

const CONFIG_ENV: &str = "TELEBRIDGE_CONFIG";
const DEFAULT_CONFIG: &str = "telebridge.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.client_code().as_str(), error = %e, "telebridge exited");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.server.listen_addr()?;

    let state = AppState::new(cfg)?;
    let scheduler = export::start(&state)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "telebridge-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| BridgeError::Internal(format!("bind {listen} failed: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal(state.clone()))
        .await
        .map_err(|e| BridgeError::Internal(format!("server failed: {e}")));

    if let Some(handle) = scheduler {
        handle.stop().await;
    }
    if let Err(e) = state.sink().shutdown().await {
        tracing::warn!(error = %e, "final flush failed");
    }
    tracing::info!("telebridge-gateway stopped");

    served
}
