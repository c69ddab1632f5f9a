use super::socket::serve_client;
use super::state::AppState;
use crate::session::{SessionId, SessionStats};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET <websocket path>
/// Upgrade to the client audio/transcript channel; one relay session per connection
pub async fn websocket(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    if state.registry.is_shutting_down() {
        warn!("Rejecting client connection during shutdown");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Server shutting down".to_string(),
            }),
        )
            .into_response();
    }

    info!("Accepting client connection");
    ws.on_upgrade(move |socket| serve_client(socket, state))
}

/// GET /sessions
/// Statistics for every active session
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<SessionStats> = state.registry.all_stats().await;
    (StatusCode::OK, Json(sessions))
}

/// GET /sessions/:session_id
/// Statistics for one active session
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let id = SessionId::from(session_id);

    match state.registry.stats(&id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
