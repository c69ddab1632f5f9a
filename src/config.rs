use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable consulted when `upstream.api_key` is not configured
pub const API_KEY_ENV: &str = "DEEPGRAM_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "transcription-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
    /// Path of the client WebSocket endpoint
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3001,
            path: "/websocket".to_string(),
        }
    }
}

/// Streaming transcription service settings (Deepgram live API)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub smart_format: bool,
    pub interim_results: bool,
    pub connect_timeout_ms: u64,
    /// Idle time after which a KeepAlive is sent; 0 disables keepalives
    pub keepalive_interval_ms: u64,
    /// How long `close()` waits for the service to finish the stream
    pub close_grace_ms: u64,
    /// Capacity of the adapter's event and command channels
    pub event_buffer: usize,
    /// Upper bound on one socket write to the service
    pub write_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: None,
            model: "nova-2".to_string(),
            language: "en-GB".to_string(),
            encoding: "linear16".to_string(),
            sample_rate: 16000,
            channels: 1,
            smart_format: true,
            interim_results: false,
            connect_timeout_ms: 10_000,
            keepalive_interval_ms: 5_000,
            close_grace_ms: 2_000,
            event_buffer: 64,
            write_timeout_ms: 5_000,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Configured key, else the `DEEPGRAM_API_KEY` environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Per-session relay behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Queue depth between a session and its client socket writer
    pub outbound_buffer: usize,
    /// Protocol violations tolerated before the session is closed
    pub max_protocol_violations: u32,
    /// Upper bound on each teardown step (upstream close, client flush)
    pub close_timeout_ms: u64,
    /// Upper bound on handing one frame upstream or one message to the client writer
    pub send_timeout_ms: u64,
    /// Forward transcript events whose top alternative is empty
    pub forward_empty_transcripts: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            max_protocol_violations: 5,
            close_timeout_ms: 3_000,
            send_timeout_ms: 3_000,
            forward_empty_transcripts: false,
        }
    }
}

impl RelayConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Config {
    /// Load defaults, then the optional file at `path`, then `RELAY_*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
