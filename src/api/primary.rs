//! Primary HTTP API
//!
//! `POST /send_log`, `GET /logs`, `GET /health` - exactly the primary surface
//! named in the design, nothing more.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::replication::primary::AppendStatus;
use crate::replication::PrimaryReplicator;

/// Shared state injected into every handler.
pub struct AppState {
    pub replicator: Arc<PrimaryReplicator>,
}

pub fn router(replicator: Arc<PrimaryReplicator>) -> Router {
    let state = Arc::new(AppState { replicator });

    Router::new()
        .route("/send_log", post(send_log))
        .route("/logs", get(get_logs))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct SendLogRequest {
    message: String,
    #[serde(default = "default_w")]
    w: usize,
}

fn default_w() -> usize {
    1
}

#[derive(Debug, Serialize)]
struct SendLogResponse {
    status: u16,
    acks: usize,
    message_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn send_log(State(state): State<Arc<AppState>>, Json(req): Json<SendLogRequest>) -> impl IntoResponse {
    let w = req.w;
    match state.replicator.append(req.message, w).await {
        Ok(result) => match result.status {
            AppendStatus::Committed => (
                StatusCode::OK,
                Json(SendLogResponse {
                    status: 200,
                    acks: result.acks,
                    message_id: result.id,
                    message: None,
                }),
            ),
            AppendStatus::PartiallyAccepted => (
                StatusCode::ACCEPTED,
                Json(SendLogResponse {
                    status: 202,
                    acks: result.acks,
                    message_id: result.id,
                    message: Some(format!(
                        "Accepted but only {}/{} acks received",
                        result.acks, w
                    )),
                }),
            ),
        },
        Err(Error::InvalidWriteConcern { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(SendLogResponse {
                status: 400,
                acks: 0,
                message_id: 0,
                message: Some("w exceeds total node count".to_string()),
            }),
        ),
        Err(Error::ReadOnly) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SendLogResponse {
                status: 503,
                acks: 0,
                message_id: 0,
                message: Some("read-only mode: quorum lost".to_string()),
            }),
        ),
        Err(e) => {
            tracing::error!("internal error handling send_log: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SendLogResponse {
                    status: 500,
                    acks: 0,
                    message_id: 0,
                    message: Some("internal error".to_string()),
                }),
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<LogLine>,
}

#[derive(Debug, Serialize)]
struct LogLine {
    id: u64,
    message: String,
}

async fn get_logs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let logs = state
        .replicator
        .read_log()
        .await
        .into_iter()
        .map(|e| LogLine {
            id: e.id,
            message: e.payload,
        })
        .collect();

    Json(LogsResponse { logs })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    read_only_mode: bool,
    secondaries: std::collections::HashMap<String, SecondaryStatus>,
}

#[derive(Debug, Serialize)]
struct SecondaryStatus {
    status: String,
    last_check_secs_ago: u64,
    last_log_id: u64,
}

async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.replicator.health().await;
    let secondaries = snapshot
        .peers
        .into_iter()
        .map(|(name, peer)| {
            (
                name,
                SecondaryStatus {
                    status: peer.status.to_string(),
                    last_check_secs_ago: peer.last_check.elapsed().as_secs(),
                    last_log_id: peer.last_log_id,
                },
            )
        })
        .collect();

    Json(HealthResponse {
        read_only_mode: snapshot.read_only,
        secondaries,
    })
}
