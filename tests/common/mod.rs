// Shared fakes for relay tests
//
// FakeUpstream stands in for the transcription service: it records every call
// the relay makes and lets a test inject upstream events at will.

#![allow(dead_code)]

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use transcription_relay::config::RelayConfig;
use transcription_relay::{
    AudioFrame, CaptureMode, ClientFrame, RelaySession, ServerMessage, SessionId,
    SessionRegistry, SessionStats, UpstreamAdapter, UpstreamEvent, UpstreamFactory,
};

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct FakeState {
    pub mode: Option<CaptureMode>,
    pub created: usize,
    pub open_calls: usize,
    pub close_calls: usize,
    pub send_calls: usize,
    pub frames: Vec<Vec<u8>>,
    events: Option<mpsc::Sender<UpstreamEvent>>,
}

impl FakeState {
    pub fn bytes_received(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

/// Fake transcription service; doubles as the adapter factory
#[derive(Clone, Default)]
pub struct FakeUpstream {
    state: Arc<Mutex<FakeState>>,
    changed: Arc<Notify>,
    fail_open: bool,
    stall_send: bool,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open()` fails as if the connection were refused
    pub fn refusing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Opens normally, but every `send()` hangs as if the socket were stuck
    pub fn stalling() -> Self {
        Self {
            stall_send: true,
            ..Self::default()
        }
    }

    pub fn send_calls(&self) -> usize {
        self.inspect(|s| s.send_calls)
    }

    pub fn inspect<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn bytes_received(&self) -> usize {
        self.inspect(|s| s.bytes_received())
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inspect(|s| s.frames.clone())
    }

    pub fn open_calls(&self) -> usize {
        self.inspect(|s| s.open_calls)
    }

    pub fn close_calls(&self) -> usize {
        self.inspect(|s| s.close_calls)
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.inspect(|s| s.mode)
    }

    /// Wait until `condition` holds, panicking after `WAIT`
    pub async fn wait_until(&self, what: &str, condition: impl Fn(&FakeState) -> bool) {
        let result = timeout(WAIT, async {
            loop {
                let notified = self.changed.notified();
                let done = condition(&self.state.lock().unwrap());
                if done {
                    return;
                }
                notified.await;
            }
        })
        .await;
        if result.is_err() {
            panic!("timed out waiting for upstream: {}", what);
        }
    }

    pub async fn wait_opened(&self) {
        self.wait_until("open", |s| s.open_calls > 0).await;
    }

    pub async fn wait_closed(&self) {
        self.wait_until("close", |s| s.close_calls > 0).await;
    }

    /// Deliver an event to the relay as if the service had sent it
    pub async fn emit(&self, event: UpstreamEvent) {
        let sender = self.inspect(|s| s.events.clone());
        let sender = sender.expect("upstream not open");
        sender.send(event).await.expect("relay stopped listening");
    }

    fn touch(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
        self.changed.notify_waiters();
    }
}

impl UpstreamFactory for FakeUpstream {
    fn create(&self, _session_id: &SessionId, mode: CaptureMode) -> Box<dyn UpstreamAdapter> {
        self.touch(|s| {
            s.created += 1;
            s.mode = Some(mode);
        });
        Box::new(FakeAdapter {
            upstream: self.clone(),
        })
    }
}

struct FakeAdapter {
    upstream: FakeUpstream,
}

#[async_trait::async_trait]
impl UpstreamAdapter for FakeAdapter {
    async fn open(&mut self) -> Result<mpsc::Receiver<UpstreamEvent>> {
        if self.upstream.fail_open {
            self.upstream.touch(|s| s.open_calls += 1);
            anyhow::bail!("connection refused");
        }
        let (tx, rx) = mpsc::channel(64);
        self.upstream.touch(|s| {
            s.open_calls += 1;
            s.events = Some(tx);
        });
        Ok(rx)
    }

    async fn send(&mut self, frame: AudioFrame) -> Result<()> {
        let open = self.upstream.inspect(|s| s.events.is_some());
        if !open {
            anyhow::bail!("send before open");
        }
        self.upstream.touch(|s| s.send_calls += 1);
        if self.upstream.stall_send {
            std::future::pending::<()>().await;
        }
        self.upstream.touch(|s| s.frames.push(frame.into_bytes()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.upstream.touch(|s| {
            s.close_calls += 1;
            s.events = None;
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_relay_config() -> RelayConfig {
    RelayConfig {
        close_timeout_ms: 500,
        send_timeout_ms: 500,
        ..RelayConfig::default()
    }
}

/// A relay session running on its own task, driven through in-memory channels
pub struct Harness {
    pub id: SessionId,
    pub upstream: FakeUpstream,
    pub registry: SessionRegistry,
    pub client: futures::channel::mpsc::UnboundedSender<ClientFrame>,
    pub outbound: mpsc::Receiver<ServerMessage>,
    pub task: JoinHandle<SessionStats>,
}

impl Harness {
    pub async fn spawn(upstream: FakeUpstream, config: RelayConfig) -> Self {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        let (outbound_tx, outbound) = mpsc::channel(config.outbound_buffer);
        let (client, inbound) = futures::channel::mpsc::unbounded();

        let session = RelaySession::register(
            id.clone(),
            registry.clone(),
            Arc::new(upstream.clone()),
            config,
            outbound_tx,
        )
        .await
        .expect("session registers");

        let task = tokio::spawn(session.run(inbound));

        Self {
            id,
            upstream,
            registry,
            client,
            outbound,
            task,
        }
    }

    pub fn send(&self, frame: ClientFrame) {
        self.client.unbounded_send(frame).expect("session inbound open");
    }

    pub fn send_text(&self, text: &str) {
        self.send(ClientFrame::Text(text.to_string()));
    }

    pub fn send_audio(&self, bytes: Vec<u8>) {
        self.send(ClientFrame::Binary(bytes));
    }

    pub fn start_microphone(&self) {
        self.send_text(r#"{"action":"start_microphone"}"#);
    }

    pub fn stop(&self) {
        self.send_text(r#"{"action":"stop"}"#);
    }

    /// Next message for the client; panics if none arrives in time
    pub async fn recv(&mut self) -> ServerMessage {
        timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client channel closed")
    }

    /// Everything still queued for the client, until the session drops the channel
    pub async fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            match timeout(WAIT, self.outbound.recv()).await {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => return messages,
                Err(_) => panic!("client channel never closed; got {:?}", messages),
            }
        }
    }

    /// Start, open upstream and consume the ready status
    pub async fn start_streaming(&mut self) {
        self.start_microphone();
        self.upstream.wait_opened().await;
        self.upstream.emit(UpstreamEvent::Open).await;
        let ready = self.recv().await;
        assert!(ready.is_ready(), "expected ready status, got {:?}", ready);
    }

    pub async fn finish(self) -> SessionStats {
        timeout(WAIT, self.task)
            .await
            .expect("session did not finish in time")
            .expect("session task panicked")
    }
}

pub fn transcript_text(message: &ServerMessage) -> Option<String> {
    match message {
        ServerMessage::Transcript { data } => data["channel"]["alternatives"][0]["transcript"]
            .as_str()
            .map(str::to_string),
        _ => None,
    }
}
