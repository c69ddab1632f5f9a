use serde::{Deserialize, Serialize};
use std::fmt;

/// Status text that unblocks the client's capture pipeline
pub const READY_MESSAGE: &str = "Ready to receive audio";

/// Error text sent to clients when the server is shutting down
pub const SHUTDOWN_MESSAGE: &str = "Server shutting down";

/// Which audio track the client is capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    Microphone,
    ScreenShare,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Microphone => f.write_str("microphone"),
            CaptureMode::ScreenShare => f.write_str("screen-share"),
        }
    }
}

/// Control message sent by the client (`{"action": ...}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    StartMicrophone,
    StartScreenshare,
    Stop,
}

impl ClientMessage {
    /// Capture mode declared by a `start_*` action
    pub fn capture_mode(&self) -> Option<CaptureMode> {
        match self {
            ClientMessage::StartMicrophone => Some(CaptureMode::Microphone),
            ClientMessage::StartScreenshare => Some(CaptureMode::ScreenShare),
            ClientMessage::Stop => None,
        }
    }

    pub fn start(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Microphone => ClientMessage::StartMicrophone,
            CaptureMode::ScreenShare => ClientMessage::StartScreenshare,
        }
    }
}

/// Control message sent to the client (`{"type": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status { message: String },
    /// `data` is the upstream result object, forwarded unchanged
    Transcript { data: serde_json::Value },
    Error { message: String },
}

impl ServerMessage {
    pub fn ready() -> Self {
        ServerMessage::Status {
            message: READY_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ServerMessage::Status { message } if message == READY_MESSAGE)
    }
}

/// One inbound unit from the client transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Textual frame, expected to hold a JSON `ClientMessage`
    Text(String),
    /// Raw PCM audio
    Binary(Vec<u8>),
    /// Client closed the connection
    Close,
    /// Transport failure reported by the socket
    Error(String),
}
