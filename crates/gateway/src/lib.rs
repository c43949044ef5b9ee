//! HTTP gateway for LakeClaw.
//!
//! A thin transport over the runtime: health, the action catalog, tool
//! declarations, direct action invocation and chat. Session identity comes
//! from the `x-session-id` header.
//!
//! Built on Axum.

pub mod api_v1;
pub mod runtime;

pub use runtime::{Runtime, SetupError};

use axum::extract::DefaultBodyLimit;
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type SharedState = Arc<Runtime>;

/// Request bodies above this are rejected.
const BODY_LIMIT: usize = 1024 * 1024;

/// Build the router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve until `shutdown` fires. Also runs the idle-session sweeper.
pub async fn start(runtime: SharedState, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", runtime.config.gateway.host, runtime.config.gateway.port);
    let sweeper = runtime.spawn_sweeper(shutdown.child_token());

    let app = build_router(runtime);
    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    info!("Gateway stopped");
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    actions: usize,
    engine: Option<String>,
    sessions: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        actions: state.executor.registry().len(),
        engine: state
            .orchestrator
            .as_ref()
            .map(|_| state.config.default_provider.clone()),
        sessions: state.sessions.len().await,
    })
}
