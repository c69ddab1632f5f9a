//! HTTP/WebSocket server
//!
//! This module provides the client-facing surface:
//! - GET <path> (default /websocket) - WebSocket audio/transcript channel
//! - GET /sessions - Active session statistics
//! - GET /sessions/:id - One session's statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod socket;
mod state;

pub use routes::create_router;
pub use socket::serve_client;
pub use state::AppState;
