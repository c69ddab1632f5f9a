use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use super::control::{CaptureMode, ClientFrame, ClientMessage, ServerMessage};
use super::registry::{SessionEntry, SessionRegistry, SessionStatus};
use super::state::{CloseReason, SessionId, SessionState};
use super::stats::{SessionCounters, SessionStats};
use crate::audio::AudioFrame;
use crate::config::RelayConfig;
use crate::upstream::{UpstreamAdapter, UpstreamEvent, UpstreamFactory};

/// Outcome of dispatching one event
enum Step {
    Continue,
    Close(CloseReason),
}

/// Next thing the session has to react to
enum Event {
    Client(Option<ClientFrame>),
    Upstream(Option<UpstreamEvent>),
    Shutdown,
}

/// Pairs one client connection with one upstream transcription stream
///
/// The session owns its state exclusively. Inbound client frames, upstream events
/// and the process shutdown signal are multiplexed in `run`, and each source has a
/// single dispatch function. Everything the client should see is pushed onto the
/// outbound queue; dropping that queue is what closes the client socket.
pub struct RelaySession {
    id: SessionId,
    config: RelayConfig,
    state: SessionState,
    mode: Option<CaptureMode>,
    started_at: DateTime<Utc>,
    status: watch::Sender<SessionStatus>,
    counters: Arc<SessionCounters>,
    factory: Arc<dyn UpstreamFactory>,
    upstream: Option<Box<dyn UpstreamAdapter>>,
    upstream_events: Option<mpsc::Receiver<UpstreamEvent>>,
    outbound: Option<mpsc::Sender<ServerMessage>>,
    registry: SessionRegistry,
    shutdown: watch::Receiver<bool>,
}

impl RelaySession {
    /// Create a session in `Connecting` and insert it into the registry
    pub async fn register(
        id: SessionId,
        registry: SessionRegistry,
        factory: Arc<dyn UpstreamFactory>,
        config: RelayConfig,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<Self> {
        let counters = Arc::new(SessionCounters::default());
        let (status, status_rx) = watch::channel(SessionStatus::default());
        let entry = SessionEntry::new(Arc::clone(&counters), status_rx);
        let started_at = entry.started_at;

        registry.insert(id.clone(), entry).await?;
        let shutdown = registry.shutdown_signal();

        Ok(Self {
            id,
            config,
            state: SessionState::Connecting,
            mode: None,
            started_at,
            status,
            counters,
            factory,
            upstream: None,
            upstream_events: None,
            outbound: Some(outbound),
            registry,
            shutdown,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until it reaches `Closed`
    ///
    /// `inbound` yields client frames in receipt order; its end counts as a
    /// client disconnect.
    pub async fn run<S>(self, inbound: S) -> SessionStats
    where
        S: Stream<Item = ClientFrame> + Unpin + Send,
    {
        let span = info_span!("session", session_id = %self.id);
        self.drive(inbound).instrument(span).await
    }

    async fn drive<S>(mut self, mut inbound: S) -> SessionStats
    where
        S: Stream<Item = ClientFrame> + Unpin + Send,
    {
        info!("Frontend client connected");

        let reason = loop {
            if *self.shutdown.borrow() {
                break CloseReason::Shutdown;
            }

            let event = tokio::select! {
                frame = inbound.next() => Event::Client(frame),
                event = next_upstream_event(&mut self.upstream_events) => Event::Upstream(event),
                _ = self.shutdown.changed() => Event::Shutdown,
            };

            let step = match event {
                Event::Client(Some(frame)) => self.on_client_frame(frame).await,
                Event::Client(None) => {
                    info!("Frontend client stream ended");
                    Step::Close(CloseReason::ClientDisconnected)
                }
                Event::Upstream(Some(event)) => self.on_upstream_event(event).await,
                Event::Upstream(None) => self.on_upstream_event(UpstreamEvent::Closed).await,
                Event::Shutdown => Step::Close(CloseReason::Shutdown),
            };

            if let Step::Close(reason) = step {
                break reason;
            }
        };

        self.close(reason).await;
        self.transition(SessionState::Closed);

        let stats = SessionStats::capture(
            &self.id,
            self.mode,
            self.state,
            self.started_at,
            &self.counters,
        );
        info!(
            frames = stats.frames_forwarded,
            bytes = stats.bytes_forwarded,
            dropped = stats.frames_dropped,
            transcripts = stats.transcripts_sent,
            duration_secs = stats.duration_secs,
            "Connection summary"
        );
        stats
    }

    async fn on_client_frame(&mut self, frame: ClientFrame) -> Step {
        match frame {
            ClientFrame::Binary(data) => self.on_audio(AudioFrame::new(data)).await,
            ClientFrame::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.on_control(message).await,
                Err(e) => self.protocol_violation(format!("unparseable control message: {}", e)),
            },
            ClientFrame::Close => {
                info!("Frontend client disconnected");
                Step::Close(CloseReason::ClientDisconnected)
            }
            ClientFrame::Error(e) => {
                warn!("WebSocket error with frontend client: {}", e);
                Step::Close(CloseReason::TransportError(e))
            }
        }
    }

    async fn on_control(&mut self, message: ClientMessage) -> Step {
        let Some(mode) = message.capture_mode() else {
            info!("Client requested stop");
            return Step::Close(CloseReason::StopRequested);
        };

        if self.state != SessionState::Connecting {
            return self.protocol_violation(format!(
                "start action for {} while {}",
                mode, self.state
            ));
        }

        self.start_upstream(mode).await
    }

    async fn start_upstream(&mut self, mode: CaptureMode) -> Step {
        self.mode = Some(mode);

        let mut adapter = self.factory.create(&self.id, mode);
        info!(mode = %mode, adapter = adapter.name(), "Initializing upstream connection");

        let opened = adapter.open().await;
        // Kept even on failure so teardown still closes it
        self.upstream = Some(adapter);

        match opened {
            Ok(events) => {
                self.upstream_events = Some(events);
                self.transition(SessionState::AwaitingUpstreamReady);
                Step::Continue
            }
            Err(e) => {
                error!("Failed to open upstream connection: {:#}", e);
                Step::Close(CloseReason::UpstreamError(e.to_string()))
            }
        }
    }

    async fn on_audio(&mut self, frame: AudioFrame) -> Step {
        if !self.state.is_ready() {
            self.counters.record_dropped();
            debug!(
                state = %self.state,
                bytes = frame.len(),
                "Dropping audio received before upstream ready"
            );
            return Step::Continue;
        }

        let Some(upstream) = self.upstream.as_mut() else {
            self.counters.record_dropped();
            return Step::Continue;
        };

        let len = frame.len();
        let limit = self.config.send_timeout();
        // A stalled upstream must not hide a shutdown from the session
        let sent = tokio::select! {
            result = timeout(limit, upstream.send(frame)) => result,
            _ = self.shutdown.changed() => return Step::Close(CloseReason::Shutdown),
        };

        match sent {
            Ok(Ok(())) => {
                self.counters.record_forwarded(len);
                trace!(
                    frames = self.counters.frames_forwarded(),
                    bytes = self.counters.bytes_forwarded(),
                    "Forwarded audio chunk: {} bytes",
                    len
                );
                Step::Continue
            }
            Ok(Err(e)) => {
                warn!("Error sending audio upstream: {:#}", e);
                Step::Close(CloseReason::UpstreamError(e.to_string()))
            }
            Err(_) => {
                warn!("Upstream did not accept audio within {:?}", limit);
                Step::Close(CloseReason::UpstreamError("audio send timed out".to_string()))
            }
        }
    }

    async fn on_upstream_event(&mut self, event: UpstreamEvent) -> Step {
        match event {
            UpstreamEvent::Open => {
                if self.state != SessionState::AwaitingUpstreamReady {
                    warn!(state = %self.state, "Ignoring unexpected upstream open");
                    return Step::Continue;
                }
                self.transition(SessionState::Streaming);
                info!("Upstream ready, client may send audio");
                self.send_to_client(ServerMessage::ready()).await
            }
            UpstreamEvent::Transcript(transcript) => {
                if !self.state.is_ready() {
                    debug!(state = %self.state, "Ignoring transcript outside streaming");
                    return Step::Continue;
                }
                if transcript.text().is_empty() && !self.config.forward_empty_transcripts {
                    debug!(is_final = transcript.is_final, "Received empty transcript");
                    return Step::Continue;
                }

                info!(is_final = transcript.is_final, "Transcript received: {:?}", transcript.text());
                let step = self
                    .send_to_client(ServerMessage::Transcript {
                        data: transcript.payload,
                    })
                    .await;
                if matches!(step, Step::Continue) {
                    self.counters.record_transcript();
                }
                step
            }
            UpstreamEvent::Closed => {
                info!("Upstream connection closed");
                Step::Close(CloseReason::UpstreamClosed)
            }
            UpstreamEvent::Error { detail } => {
                error!("Upstream error: {}", detail);
                Step::Close(CloseReason::UpstreamError(detail))
            }
        }
    }

    fn protocol_violation(&mut self, detail: String) -> Step {
        let total = self.counters.record_violation();
        warn!(violations = total, "Protocol violation: {}", detail);

        let limit = self.config.max_protocol_violations as u64;
        if limit > 0 && total >= limit {
            Step::Close(CloseReason::ProtocolViolations(total as u32))
        } else {
            Step::Continue
        }
    }

    async fn send_to_client(&mut self, message: ServerMessage) -> Step {
        let Some(outbound) = self.outbound.as_ref() else {
            return Step::Close(CloseReason::ClientDisconnected);
        };
        let limit = self.config.send_timeout();
        let sent = tokio::select! {
            result = timeout(limit, outbound.send(message)) => result,
            _ = self.shutdown.changed() => return Step::Close(CloseReason::Shutdown),
        };

        match sent {
            Ok(Ok(())) => Step::Continue,
            Ok(Err(_)) => {
                debug!("Client writer gone");
                Step::Close(CloseReason::ClientDisconnected)
            }
            Err(_) => {
                warn!("Client did not drain its queue within {:?}", limit);
                Step::Close(CloseReason::TransportError("client not reading".to_string()))
            }
        }
    }

    /// Tear down both sides; every step is bounded by `close_timeout`
    async fn close(&mut self, reason: CloseReason) {
        self.transition(SessionState::Closing);
        info!(reason = %reason, "Closing session");

        let limit = self.config.close_timeout();

        // Stop listening first so a chatty upstream cannot block on a full queue
        self.upstream_events = None;

        let outbound = self.outbound.take();
        if let (Some(outbound), Some(message)) = (outbound.as_ref(), reason.client_error()) {
            if timeout(limit, outbound.send(ServerMessage::error(message)))
                .await
                .is_err()
            {
                warn!("Timed out delivering final error to client");
            }
        }

        if let Some(mut upstream) = self.upstream.take() {
            match timeout(limit, upstream.close()).await {
                Ok(Ok(())) => debug!("Upstream closed"),
                Ok(Err(e)) => warn!("Error closing upstream: {:#}", e),
                Err(_) => warn!("Upstream close timed out after {:?}", limit),
            }
        }

        // The writer flushes what is queued, then closes the socket
        drop(outbound);

        self.registry.remove(&self.id).await;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "Session state change");
        self.state = next;
        self.status.send_replace(SessionStatus {
            state: next,
            mode: self.mode,
        });
    }
}

async fn next_upstream_event(
    events: &mut Option<mpsc::Receiver<UpstreamEvent>>,
) -> Option<UpstreamEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
