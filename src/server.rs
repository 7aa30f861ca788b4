//! Liveness HTTP server.
//!
//! Hosting platforms poll the bot over HTTP to decide whether the process
//! is alive. The server answers without touching the corpus or the model.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Plain-text liveness banner |
//! | `GET`  | `/health` | JSON status with version and start time |

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::Config;

pub const ALIVE_BANNER: &str = "Codex20 is alive!\n";

#[derive(Clone)]
struct AppState {
    started_at: DateTime<Utc>,
}

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
    started_at: DateTime<Utc>,
}

pub fn router() -> Router {
    let state = AppState {
        started_at: Utc::now(),
    };
    Router::new()
        .route("/", get(handle_alive))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "health check server listening");
    serve(listener).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router()).await?;
    Ok(())
}

async fn handle_alive() -> &'static str {
    ALIVE_BANNER
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
    })
}
