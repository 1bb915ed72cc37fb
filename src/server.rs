//! HTTP ingest for adaptor events.
//!
//! This module provides an HTTP server that:
//! - Accepts adaptor messages via `POST /events` (one message or an array)
//! - Hands them to the agent loop over the same channel the line reader uses
//! - Reports agent counters via `GET /health`
//!
//! # Architecture
//!
//! ```text
//! Sensor adaptor ──→ POST /events ──→ channel ──→ agent loop ──→ sink
//! ```

use crate::adaptor::AdaptorMessage;
use crate::stats::{SharedStats, StatsSnapshot};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Shared server state
pub struct ServerState {
    sender: Sender<AdaptorMessage>,
    stats: SharedStats,
}

/// Request body: a single message or a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    One(AdaptorMessage),
    Many(Vec<AdaptorMessage>),
}

impl EventBatch {
    fn into_messages(self) -> Vec<AdaptorMessage> {
        match self {
            EventBatch::One(message) => vec![message],
            EventBatch::Many(messages) => messages,
        }
    }
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub accepted: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub stats: StatsSnapshot,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats: state.stats.snapshot(),
    })
}

/// POST /events
async fn events(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<EventBatch>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut accepted = 0;
    for message in batch.into_messages() {
        match state.sender.try_send(message) {
            Ok(()) => accepted += 1,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event queue full, rejecting after {accepted} events");
                return Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: format!("Event queue full ({accepted} accepted)"),
                        code: "QUEUE_FULL".to_string(),
                    }),
                ));
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("Agent loop is gone");
                return Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorResponse {
                        error: "Agent is shutting down".to_string(),
                        code: "SHUTTING_DOWN".to_string(),
                    }),
                ));
            }
        }
    }

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        accepted,
    }))
}

/// Build the router.
pub fn router(sender: Sender<AdaptorMessage>, stats: SharedStats) -> Router {
    let state = Arc::new(ServerState { sender, stats });
    Router::new()
        .route("/health", get(health))
        .route("/events", post(events))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server on loopback. Port 0 picks a free port.
pub async fn run(
    port: u16,
    sender: Sender<AdaptorMessage>,
    stats: SharedStats,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(sender, stats);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Event ingest listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
