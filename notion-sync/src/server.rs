//! HTTP trigger for the exporter.
//!
//! # Endpoints
//!
//! - `POST /api/sync/notion-to-github`: runs one sync, responds with the summary
//!   (`502` if the Notion root could not be read, `500` for any other failure).
//! - `GET /api/sync/health`: responds `OK`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use notion_sync_core::contract::SyncError;
use notion_sync_core::synchronise::Synchroniser;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub synchroniser: Arc<Synchroniser>,
}

async fn trigger_sync(State(state): State<AppState>) -> Response {
    tracing::info!("Sync triggered over HTTP");
    match state.synchroniser.sync().await {
        Ok(report) => (StatusCode::OK, report.summary()).into_response(),
        Err(e) => {
            let status = match e {
                SyncError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!(error = %e, status = %status, "Triggered sync failed");
            (status, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync/notion-to-github", post(trigger_sync))
        .route("/api/sync/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Resolves once `signal` fires. If the signal cannot be installed, never resolves.
async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Serves the trigger endpoints until Ctrl-C.
pub async fn serve(synchroniser: Synchroniser, port: u16) -> anyhow::Result<()> {
    let app = router(AppState {
        synchroniser: Arc::new(synchroniser),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;
    Ok(())
}
