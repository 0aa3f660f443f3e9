//! HTTP surface: run lifecycle, brand-kit indexing, artifact bytes.

mod handlers;
mod state;

use std::net::SocketAddr;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

pub use handlers::{resolve_starting_url, ApiError};
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .settings
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/brandkit/index", post(handlers::brandkit_index))
        .route("/task", post(handlers::create_task))
        .route("/runs/:run_id", get(handlers::get_run))
        .route(
            "/runs/:run_id/execute-next-step",
            post(handlers::execute_next_step),
        )
        .route(
            "/runs/:run_id/execute-first-step",
            post(handlers::execute_next_step),
        )
        .route("/runs/:run_id/approve", post(handlers::approve))
        .route("/runs/:run_id/close-session", post(handlers::close_session))
        .route("/artifacts/:run_id/:step_id/:label", get(handlers::artifact))
        .layer(cors)
        .with_state(state)
}

/// Serve until ctrl-c, then close every live browser session.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let sessions = state.sessions.clone();
    let reaper = sessions.clone().spawn_reaper();

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving http")?;

    reaper.abort();
    sessions.close_all().await;
    Ok(())
}
