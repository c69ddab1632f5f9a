use super::handlers;
use super::state::AppState;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
///
/// `websocket_path` is where clients open the audio/transcript channel.
pub fn create_router(state: AppState, websocket_path: &str) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Client channel
        .route(websocket_path, get(handlers::websocket))
        // Session queries
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        // Request logging, and CORS for browser UIs served elsewhere
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
