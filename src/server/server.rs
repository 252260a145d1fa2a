use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use super::{log_requests, state::*, ServerConfig};
use crate::mcp::{mcp_handler, Dispatcher, MCP_VERSION};

#[derive(Serialize)]
struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub protocol_version: &'static str,
    pub endpoints: Vec<&'static str>,
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: MCP_VERSION,
        endpoints: vec!["GET /", "POST /mcp"],
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

pub fn make_app(config: ServerConfig, dispatcher: Dispatcher) -> Router {
    let state = ServerState::new(config, dispatcher);

    Router::new()
        .route("/", get(home))
        .route("/mcp", post(mcp_handler))
        .with_state(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn_with_state(state, log_requests))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}

pub async fn run_server(config: ServerConfig, dispatcher: Dispatcher) -> Result<()> {
    let address = config.bind_address();
    let app = make_app(config, dispatcher);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Ready to serve at {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
