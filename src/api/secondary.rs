//! Secondary HTTP API
//!
//! `GET /logs`, `GET /health` - the secondary's read-only surface.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::replication::SecondaryApplier;

pub struct AppState {
    pub applier: Arc<SecondaryApplier>,
}

pub fn router(applier: Arc<SecondaryApplier>) -> Router {
    let state = Arc::new(AppState { applier });

    Router::new()
        .route("/logs", get(get_logs))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
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
        .applier
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
    status: &'static str,
    last_log_id: u64,
    total_logs: usize,
    buffered_messages: usize,
    next_expected_id: u64,
}

async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.applier.health().await;

    Json(HealthResponse {
        status: "Healthy",
        last_log_id: health.last_log_id,
        total_logs: health.total_logs,
        buffered_messages: health.buffered_messages,
        next_expected_id: health.next_expected_id,
    })
}
