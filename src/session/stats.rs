use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::control::CaptureMode;
use super::state::{SessionId, SessionState};

/// Live counters for one session, shared with the registry for status queries
#[derive(Debug, Default)]
pub struct SessionCounters {
    frames_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    transcripts_sent: AtomicU64,
    protocol_violations: AtomicU64,
}

impl SessionCounters {
    pub fn record_forwarded(&self, bytes: usize) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcript(&self) {
        self.transcripts_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new violation total
    pub fn record_violation(&self) -> u64 {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded.load(Ordering::Relaxed)
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn transcripts_sent(&self) -> u64 {
        self.transcripts_sent.load(Ordering::Relaxed)
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics about a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,

    /// Capture mode declared by the client, once known
    pub mode: Option<CaptureMode>,

    pub state: SessionState,

    /// When the client connected
    pub started_at: DateTime<Utc>,

    /// Seconds since the client connected
    pub duration_secs: f64,

    /// Audio frames handed to the upstream adapter
    pub frames_forwarded: u64,

    /// Audio bytes handed to the upstream adapter
    pub bytes_forwarded: u64,

    /// Audio frames discarded because the session was not streaming
    pub frames_dropped: u64,

    /// Transcript messages delivered to the client
    pub transcripts_sent: u64,

    pub protocol_violations: u64,
}

impl SessionStats {
    pub fn capture(
        session_id: &SessionId,
        mode: Option<CaptureMode>,
        state: SessionState,
        started_at: DateTime<Utc>,
        counters: &SessionCounters,
    ) -> Self {
        let duration = Utc::now().signed_duration_since(started_at);

        Self {
            session_id: session_id.clone(),
            mode,
            state,
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_forwarded: counters.frames_forwarded(),
            bytes_forwarded: counters.bytes_forwarded(),
            frames_dropped: counters.frames_dropped(),
            transcripts_sent: counters.transcripts_sent(),
            protocol_violations: counters.protocol_violations(),
        }
    }
}
