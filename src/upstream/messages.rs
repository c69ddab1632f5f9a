use serde::{Deserialize, Serialize};

/// Message received from the Deepgram live API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveResponse {
    Results(LiveResults),
    Metadata(LiveMetadata),
    Error(LiveError),
    /// SpeechStarted, UtteranceEnd and other informational messages
    #[serde(other)]
    Other,
}

/// Transcription result for one span of audio
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveResults {
    #[serde(default)]
    pub channel_index: Vec<u32>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    pub channel: ResultChannel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultChannel {
    #[serde(default)]
    pub alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub words: Vec<ResultWord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punctuated_word: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveMetadata {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub channels: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveError {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl LiveError {
    pub fn detail(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.variant.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Control message sent to the Deepgram live API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamControl {
    /// Keep an idle stream from timing out
    KeepAlive,
    /// Flush pending audio and end the stream
    CloseStream,
}
