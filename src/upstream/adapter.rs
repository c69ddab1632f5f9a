use anyhow::Result;
use tokio::sync::mpsc;

use super::messages::{LiveResponse, LiveResults, ResultAlternative, ResultChannel};
use crate::audio::AudioFrame;
use crate::session::{CaptureMode, SessionId};

/// Event emitted by an upstream transcription connection
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Connection established; audio may be sent
    Open,
    Transcript(TranscriptEvent),
    /// Service ended the stream
    Closed,
    /// Connection failure or malformed response
    Error { detail: String },
}

/// One transcription result
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    /// Final result (as opposed to interim)
    pub is_final: bool,
    /// Alternative hypotheses, best first
    pub alternatives: Vec<String>,
    /// Result object exactly as the service sent it
    pub payload: serde_json::Value,
}

impl TranscriptEvent {
    pub fn from_results(results: &LiveResults, payload: serde_json::Value) -> Self {
        Self {
            is_final: results.is_final,
            alternatives: results
                .channel
                .alternatives
                .iter()
                .map(|a| a.transcript.clone())
                .collect(),
            payload,
        }
    }

    /// Build a result with a single alternative, in the service's wire shape
    pub fn from_text(text: &str, is_final: bool) -> Self {
        let results = LiveResults {
            is_final,
            speech_final: is_final,
            channel_index: vec![0, 1],
            channel: ResultChannel {
                alternatives: vec![ResultAlternative {
                    transcript: text.to_string(),
                    confidence: 1.0,
                    words: Vec::new(),
                }],
            },
            ..Default::default()
        };
        let payload = serde_json::to_value(LiveResponse::Results(results.clone()))
            .unwrap_or(serde_json::Value::Null);
        Self::from_results(&results, payload)
    }

    /// Text of the top alternative, empty if there is none
    pub fn text(&self) -> &str {
        self.alternatives.first().map(String::as_str).unwrap_or("")
    }
}

/// One streaming connection to a transcription service
///
/// Implementations:
/// - Deepgram live API over WebSocket
/// - In-memory fakes for tests
#[async_trait::async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Begin connecting
    ///
    /// Returns the event stream. `UpstreamEvent::Open` arrives on it once audio
    /// may be sent; a failed connection arrives as `UpstreamEvent::Error`.
    async fn open(&mut self) -> Result<mpsc::Receiver<UpstreamEvent>>;

    /// Forward one audio frame; only valid after `Open` was received
    async fn send(&mut self, frame: AudioFrame) -> Result<()>;

    /// Finish the stream and release the connection
    ///
    /// Idempotent and safe to call when `open` was never called.
    async fn close(&mut self) -> Result<()>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}

/// Creates one adapter per relay session
pub trait UpstreamFactory: Send + Sync {
    fn create(&self, session_id: &SessionId, mode: CaptureMode) -> Box<dyn UpstreamAdapter>;
}
