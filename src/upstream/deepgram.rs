//! Deepgram live transcription over WebSocket
//!
//! # Connection Flow
//!
//! 1. `open()` spawns a connection task and returns the event stream
//! 2. The task connects (bounded by `connect_timeout_ms`) and emits `Open`
//! 3. `send()` queues binary PCM frames for the task to write
//! 4. `close()` sends `CloseStream`, waits `close_grace_ms` for the service to
//!    finish, then aborts the task
//!
//! No reconnects: a dropped stream surfaces as `Closed` or `Error` and the relay
//! session decides what to do.

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use super::adapter::{TranscriptEvent, UpstreamAdapter, UpstreamEvent, UpstreamFactory};
use super::messages::{LiveResponse, StreamControl};
use crate::audio::AudioFrame;
use crate::config::UpstreamConfig;
use crate::session::{CaptureMode, SessionId};

enum Command {
    Audio(Vec<u8>),
    Finish,
}

/// Build the listen URL with the fixed stream parameters
pub fn listen_url(config: &UpstreamConfig) -> Result<String> {
    let mut url = Url::parse(&config.url).context("Invalid Deepgram URL")?;
    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("encoding", &config.encoding)
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("channels", &config.channels.to_string())
        .append_pair("smart_format", &config.smart_format.to_string())
        .append_pair("interim_results", &config.interim_results.to_string());
    Ok(url.into())
}

fn build_request(config: &UpstreamConfig, api_key: &str) -> Result<Request> {
    let mut request = listen_url(config)?
        .into_client_request()
        .context("Invalid Deepgram URL")?;

    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Token {}", api_key))
            .context("Invalid Deepgram API key")?,
    );

    Ok(request)
}

/// Translate one text message from the service into a relay event
///
/// Informational messages yield `None`; anything unparseable is an error.
pub fn translate_response(text: &str) -> Option<UpstreamEvent> {
    let payload: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return Some(UpstreamEvent::Error {
                detail: format!("malformed response: {}", e),
            })
        }
    };

    match serde_json::from_value::<LiveResponse>(payload.clone()) {
        Ok(LiveResponse::Results(results)) => Some(UpstreamEvent::Transcript(
            TranscriptEvent::from_results(&results, payload),
        )),
        Ok(LiveResponse::Metadata(meta)) => {
            debug!(request_id = %meta.request_id, "Deepgram metadata received");
            None
        }
        Ok(LiveResponse::Error(err)) => Some(UpstreamEvent::Error {
            detail: err.detail(),
        }),
        Ok(LiveResponse::Other) => None,
        Err(e) => Some(UpstreamEvent::Error {
            detail: format!("malformed response: {}", e),
        }),
    }
}

/// Adapter for one Deepgram live stream
pub struct DeepgramAdapter {
    config: UpstreamConfig,
    api_key: String,
    session_id: SessionId,
    commands: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl DeepgramAdapter {
    pub fn new(config: UpstreamConfig, api_key: String, session_id: SessionId) -> Self {
        Self {
            config,
            api_key,
            session_id,
            commands: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl UpstreamAdapter for DeepgramAdapter {
    async fn open(&mut self) -> Result<mpsc::Receiver<UpstreamEvent>> {
        if self.task.is_some() {
            anyhow::bail!("Deepgram stream already opened for {}", self.session_id);
        }

        let request = build_request(&self.config, &self.api_key)?;
        let buffer = self.config.event_buffer.max(1);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (command_tx, command_rx) = mpsc::channel(buffer);

        let task = tokio::spawn(
            run_connection(request, self.config.clone(), command_rx, event_tx)
                .instrument(tracing::Span::current()),
        );

        self.commands = Some(command_tx);
        self.task = Some(task);

        Ok(event_rx)
    }

    async fn send(&mut self, frame: AudioFrame) -> Result<()> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| anyhow!("Deepgram stream not open"))?;

        commands
            .send(Command::Audio(frame.into_bytes()))
            .await
            .map_err(|_| anyhow!("Deepgram connection closed"))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        let grace = self.config.close_grace();

        if let Some(commands) = self.commands.take() {
            // A full queue means the task is stuck; the abort below covers it
            let _ = timeout(grace, commands.send(Command::Finish)).await;
        }

        match timeout(grace, &mut task).await {
            Ok(Ok(())) => info!("Deepgram connection finished"),
            Ok(Err(e)) => warn!("Deepgram connection task failed: {}", e),
            Err(_) => {
                warn!("Deepgram did not finish within {:?}, aborting", grace);
                task.abort();
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "deepgram"
    }
}

impl Drop for DeepgramAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn emit(events: &mpsc::Sender<UpstreamEvent>, event: UpstreamEvent) {
    if events.send(event).await.is_err() {
        debug!("Upstream event receiver dropped");
    }
}

async fn run_connection(
    request: Request,
    config: UpstreamConfig,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<UpstreamEvent>,
) {
    info!(
        model = %config.model,
        language = %config.language,
        "Initializing Deepgram connection"
    );

    let ws_stream = match timeout(config.connect_timeout(), connect_async(request)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            error!("Deepgram connection failed: {}", e);
            emit(&events, UpstreamEvent::Error { detail: format!("connection failed: {}", e) }).await;
            return;
        }
        Err(_) => {
            error!("Deepgram connection timed out after {:?}", config.connect_timeout());
            emit(&events, UpstreamEvent::Error { detail: "connection timed out".to_string() }).await;
            return;
        }
    };

    info!("Connected to Deepgram successfully");
    emit(&events, UpstreamEvent::Open).await;

    let (mut write, mut read) = ws_stream.split();

    let keepalive = config.keepalive_interval();
    let mut ticker = keepalive.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let write_timeout = config.write_timeout();
    let mut last_write = Instant::now();
    let mut finishing = false;

    loop {
        tokio::select! {
            command = commands.recv(), if !finishing => match command {
                Some(Command::Audio(bytes)) => {
                    match timeout(write_timeout, write.send(Message::Binary(bytes))).await {
                        Ok(Ok(())) => last_write = Instant::now(),
                        Ok(Err(e)) => {
                            warn!("Error sending audio to Deepgram: {}", e);
                            emit(&events, UpstreamEvent::Error { detail: format!("send failed: {}", e) }).await;
                            break;
                        }
                        Err(_) => {
                            warn!("Deepgram socket write stalled for {:?}", write_timeout);
                            emit(&events, UpstreamEvent::Error { detail: "send timed out".to_string() }).await;
                            break;
                        }
                    }
                }
                Some(Command::Finish) | None => {
                    finishing = true;
                    info!("Closing Deepgram connection...");
                    if let Err(e) = send_control(&mut write, StreamControl::CloseStream, write_timeout).await {
                        warn!("Failed to send CloseStream: {:#}", e);
                        break;
                    }
                }
            },
            _ = next_tick(&mut ticker), if !finishing => {
                if keepalive.is_some_and(|idle| last_write.elapsed() >= idle) {
                    debug!("Sending Deepgram keepalive");
                    if let Err(e) = send_control(&mut write, StreamControl::KeepAlive, write_timeout).await {
                        warn!("Failed to send KeepAlive: {:#}", e);
                    }
                    last_write = Instant::now();
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = translate_response(&text) {
                        if let UpstreamEvent::Transcript(t) = &event {
                            debug!(is_final = t.is_final, "Received Deepgram transcript: {:?}", t.text());
                        }
                        emit(&events, event).await;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Deepgram connection closed: {:?}", frame);
                    emit(&events, UpstreamEvent::Closed).await;
                    break;
                }
                Some(Ok(_)) => {} // ping/pong/binary
                Some(Err(e)) => {
                    warn!("Deepgram error: {}", e);
                    emit(&events, UpstreamEvent::Error { detail: e.to_string() }).await;
                    break;
                }
                None => {
                    info!("Deepgram stream ended");
                    emit(&events, UpstreamEvent::Closed).await;
                    break;
                }
            }
        }
    }

    if timeout(config.close_grace(), write.close()).await.is_err() {
        debug!("Timed out closing Deepgram socket");
    }
}

async fn send_control<S>(write: &mut S, control: StreamControl, limit: Duration) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = serde_json::to_string(&control)?;
    timeout(limit, write.send(Message::Text(text)))
        .await
        .context("Timed out writing control message")??;
    Ok(())
}

/// Next keepalive tick; never resolves when keepalives are disabled
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Creates a `DeepgramAdapter` per session
pub struct DeepgramFactory {
    config: UpstreamConfig,
    api_key: String,
}

impl DeepgramFactory {
    pub fn new(config: UpstreamConfig, api_key: String) -> Self {
        Self { config, api_key }
    }
}

impl UpstreamFactory for DeepgramFactory {
    fn create(&self, session_id: &SessionId, mode: CaptureMode) -> Box<dyn UpstreamAdapter> {
        debug!(session_id = %session_id, mode = %mode, "Creating Deepgram adapter");
        Box::new(DeepgramAdapter::new(
            self.config.clone(),
            self.api_key.clone(),
            session_id.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_url_carries_stream_parameters() {
        let url = listen_url(&UpstreamConfig::default()).unwrap();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("language=en-GB"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("channels=1"));
        assert!(url.contains("smart_format=true"));
    }

    #[test]
    fn test_listen_url_encodes_values() {
        let config = UpstreamConfig {
            model: "nova 2".to_string(),
            language: "en&x=1#frag".to_string(),
            ..UpstreamConfig::default()
        };
        let url = Url::parse(&listen_url(&config).unwrap()).unwrap();

        assert_eq!(url.fragment(), None);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("model".to_string(), "nova 2".to_string())));
        assert!(pairs.contains(&("language".to_string(), "en&x=1#frag".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "x"));
        assert_eq!(pairs.len(), 7);
    }

    #[test]
    fn test_listen_url_rejects_invalid_base() {
        let config = UpstreamConfig {
            url: "not a url".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(listen_url(&config).is_err());
    }

    #[test]
    fn test_request_has_token_auth() {
        let request = build_request(&UpstreamConfig::default(), "secret").unwrap();
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Token secret"
        );
    }

    #[test]
    fn test_translate_results() {
        let text = r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"hello world","confidence":0.98}]}}"#;
        match translate_response(text) {
            Some(UpstreamEvent::Transcript(t)) => {
                assert!(t.is_final);
                assert_eq!(t.text(), "hello world");
                assert_eq!(t.payload["channel"]["alternatives"][0]["transcript"], "hello world");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_translate_ignores_informational_messages() {
        assert!(translate_response(r#"{"type":"Metadata","request_id":"abc"}"#).is_none());
        assert!(translate_response(r#"{"type":"SpeechStarted","timestamp":0.5}"#).is_none());
        assert!(translate_response(r#"{"type":"UtteranceEnd","last_word_end":1.2}"#).is_none());
    }

    #[test]
    fn test_translate_malformed_is_error() {
        assert!(matches!(
            translate_response("not json"),
            Some(UpstreamEvent::Error { .. })
        ));
        assert!(matches!(
            translate_response(r#"{"type":"Results"}"#),
            Some(UpstreamEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_before_open_is_noop() {
        let mut adapter =
            DeepgramAdapter::new(UpstreamConfig::default(), "key".to_string(), SessionId::new());
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert!(adapter.send(AudioFrame::new(vec![0; 4])).await.is_err());
    }
}
