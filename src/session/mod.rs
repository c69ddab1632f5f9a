//! Relay session management
//!
//! This module provides the `RelaySession` state machine that manages:
//! - The readiness gate between client audio and the upstream stream
//! - Forwarding audio frames upstream and transcripts back to the client
//! - Symmetric teardown of both connections
//! - Registration in the `SessionRegistry` for the session's lifetime

mod control;
mod registry;
mod relay;
mod state;
mod stats;

pub use control::{
    CaptureMode, ClientFrame, ClientMessage, ServerMessage, READY_MESSAGE, SHUTDOWN_MESSAGE,
};
pub use registry::{SessionEntry, SessionRegistry, SessionStatus};
pub use relay::RelaySession;
pub use state::{CloseReason, SessionId, SessionState};
pub use stats::{SessionCounters, SessionStats};
