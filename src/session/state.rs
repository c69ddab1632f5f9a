use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one client ↔ upstream pairing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a relay session
///
/// ```text
/// Connecting -> AwaitingUpstreamReady -> Streaming -> Closing -> Closed
///      \                 \                               ^
///       `-----------------`----- stop / failure ---------'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    AwaitingUpstreamReady,
    Streaming,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether the readiness gate is open
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }

    pub fn is_terminating(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingUpstreamReady => "awaiting_upstream_ready",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session moved to `Closing`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `{"action": "stop"}`
    StopRequested,
    /// Client socket closed or its stream ended
    ClientDisconnected,
    /// Client socket reported an error
    TransportError(String),
    /// Upstream closed the stream on its own
    UpstreamClosed,
    /// Upstream failed to open, failed mid-stream, or rejected audio
    UpstreamError(String),
    /// Too many malformed or out-of-order control messages
    ProtocolViolations(u32),
    /// Process shutdown
    Shutdown,
}

impl CloseReason {
    /// Error text owed to the client before its socket is closed, if any
    pub fn client_error(&self) -> Option<String> {
        match self {
            CloseReason::StopRequested
            | CloseReason::ClientDisconnected
            | CloseReason::TransportError(_) => None,
            CloseReason::UpstreamClosed => {
                Some("Transcription service closed the connection".to_string())
            }
            CloseReason::UpstreamError(detail) => Some(format!("Transcription service error: {}", detail)),
            CloseReason::ProtocolViolations(n) => {
                Some(format!("Too many invalid messages ({})", n))
            }
            CloseReason::Shutdown => Some(super::control::SHUTDOWN_MESSAGE.to_string()),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopRequested => f.write_str("stop requested"),
            CloseReason::ClientDisconnected => f.write_str("client disconnected"),
            CloseReason::TransportError(e) => write!(f, "client transport error: {}", e),
            CloseReason::UpstreamClosed => f.write_str("upstream closed"),
            CloseReason::UpstreamError(e) => write!(f, "upstream error: {}", e),
            CloseReason::ProtocolViolations(n) => write!(f, "{} protocol violations", n),
            CloseReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}
