use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{debug, info};

use super::control::CaptureMode;
use super::state::{SessionId, SessionState};
use super::stats::{SessionCounters, SessionStats};

/// Latest published state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub mode: Option<CaptureMode>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Connecting,
            mode: None,
        }
    }
}

/// Registry view of one live session
pub struct SessionEntry {
    pub started_at: DateTime<Utc>,
    pub counters: Arc<SessionCounters>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionEntry {
    pub fn new(counters: Arc<SessionCounters>, status: watch::Receiver<SessionStatus>) -> Self {
        Self {
            started_at: Utc::now(),
            counters,
            status,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Subscribe to state changes of this session
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn stats(&self, id: &SessionId) -> SessionStats {
        let status = self.status();
        SessionStats::capture(id, status.mode, status.state, self.started_at, &self.counters)
    }
}

/// Active relay sessions keyed by id, plus the process-wide shutdown signal
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    shutdown: Arc<watch::Sender<bool>>,
    drained: Arc<Notify>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(shutdown),
            drained: Arc::new(Notify::new()),
        }
    }

    pub async fn insert(&self, id: SessionId, entry: SessionEntry) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            anyhow::bail!("Session {} is already registered", id);
        }
        sessions.insert(id.clone(), entry);
        debug!(session_id = %id, active = sessions.len(), "Session registered");
        Ok(())
    }

    pub async fn remove(&self, id: &SessionId) -> Option<SessionEntry> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.remove(id);
        if entry.is_some() {
            debug!(session_id = %id, active = sessions.len(), "Session released");
        }
        if sessions.is_empty() {
            self.drained.notify_waiters();
        }
        entry
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn stats(&self, id: &SessionId) -> Option<SessionStats> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|entry| entry.stats(id))
    }

    pub async fn all_stats(&self) -> Vec<SessionStats> {
        let sessions = self.sessions.read().await;
        let mut stats: Vec<SessionStats> = sessions
            .iter()
            .map(|(id, entry)| entry.stats(id))
            .collect();
        stats.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        stats
    }

    pub async fn watch(&self, id: &SessionId) -> Option<watch::Receiver<SessionStatus>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(|entry| entry.watch())
    }

    /// Receiver that flips to `true` when the process starts shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Ask every session to close
    pub fn shutdown(&self) {
        info!("Signalling all sessions to close");
        self.shutdown.send_replace(true);
    }

    /// Wait until every session has released itself; `false` if `timeout` elapsed first
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty().await {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty().await;
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
