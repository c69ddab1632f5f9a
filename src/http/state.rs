use crate::config::RelayConfig;
use crate::session::SessionRegistry;
use crate::upstream::UpstreamFactory;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active relay sessions (session_id → session)
    pub registry: SessionRegistry,

    /// Creates the upstream connection for each new session
    pub upstream: Arc<dyn UpstreamFactory>,

    /// Per-session relay settings
    pub relay: RelayConfig,
}

impl AppState {
    pub fn new(
        registry: SessionRegistry,
        upstream: Arc<dyn UpstreamFactory>,
        relay: RelayConfig,
    ) -> Self {
        Self {
            registry,
            upstream,
            relay,
        }
    }
}
