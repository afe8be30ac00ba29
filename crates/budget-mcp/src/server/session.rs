//! Session registry for the streamable HTTP transport.
//!
//! Each connected client gets one session at `initialize` time. A session
//! moves Created → Active (after the `initialized` acknowledgment) →
//! Streaming (an SSE channel is bound) and back, until an idle sweep or
//! explicit close ends it.
//!
//! The outbound side is a per-session mpsc queue: any component may enqueue
//! an event for a session, the streaming handler drains it. Delivery is
//! at-most-once — events pushed while no channel is bound are dropped; the
//! synchronous POST result remains authoritative.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, mpsc};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `initialize` succeeded; waiting for the `initialized` acknowledgment.
    Created,
    /// Fully negotiated; tool calls permitted.
    Active,
    /// An SSE channel is currently bound.
    Streaming,
    /// Idle timeout, explicit close, or shutdown.
    Closed,
}

/// An event queued for a session's SSE channel.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    /// SSE event name (e.g. "message", "connected").
    pub event: String,
    /// JSON payload.
    pub data: String,
}

struct ChannelSlot {
    /// Bumped on every bind so a stale guard cannot release a newer channel.
    generation: u64,
    sender: Option<mpsc::UnboundedSender<OutboundEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single MCP session.
pub struct Session {
    /// Unique session identifier (UUID v4).
    pub id: String,
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Client name/version as sent in `initialize`.
    pub client_info: serde_json::Value,
    created_at: Instant,
    last_active: Mutex<Instant>,
    state: Mutex<SessionState>,
    channel: Mutex<ChannelSlot>,
}

impl Session {
    fn new(id: String, protocol_version: String, client_info: serde_json::Value) -> Self {
        Self {
            id,
            protocol_version,
            client_info,
            created_at: Instant::now(),
            last_active: Mutex::new(Instant::now()),
            state: Mutex::new(SessionState::Created),
            channel: Mutex::new(ChannelSlot { generation: 0, sender: None }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Update the activity timestamp.
    pub fn touch(&self) {
        *lock(&self.last_active) = Instant::now();
    }

    /// Session age, for diagnostics.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Move Created → Active (the `initialized` acknowledgment, or the first
    /// tool call from clients that skip it).
    pub fn mark_active(&self) {
        let mut state = lock(&self.state);
        if *state == SessionState::Created {
            *state = SessionState::Active;
        }
    }

    /// Close the session and release any bound channel.
    pub fn close(&self) {
        *lock(&self.state) = SessionState::Closed;
        lock(&self.channel).sender = None;
    }

    /// Bind a fresh SSE channel, superseding any existing one.
    ///
    /// Dropping the previous sender terminates the superseded stream. The
    /// returned guard releases the binding (and moves the session back to
    /// Active) when the new stream is dropped, unless an even newer channel
    /// has taken over by then.
    pub fn bind_channel(self: Arc<Self>) -> (mpsc::UnboundedReceiver<OutboundEvent>, ChannelGuard) {
        let (tx, rx) = mpsc::unbounded_channel();

        let generation = {
            let mut slot = lock(&self.channel);
            slot.generation += 1;
            slot.sender = Some(tx);
            slot.generation
        };

        {
            let mut state = lock(&self.state);
            if *state != SessionState::Closed {
                *state = SessionState::Streaming;
            }
        }
        self.touch();

        (rx, ChannelGuard { session: Arc::downgrade(&self), generation })
    }

    /// Queue an event for the bound channel.
    ///
    /// Returns false when no channel is bound or the receiver is gone; the
    /// event is dropped in that case.
    pub fn push_event(&self, event: impl Into<String>, data: impl Into<String>) -> bool {
        let slot = lock(&self.channel);
        let Some(ref sender) = slot.sender else {
            return false;
        };
        sender.send(OutboundEvent { event: event.into(), data: data.into() }).is_ok()
    }

    /// Queue a JSON-RPC notification for the bound channel.
    pub fn notify(&self, method: &str, params: serde_json::Value) -> bool {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.push_event("message", payload.to_string())
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        lock(&self.last_active).elapsed() > timeout
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("protocol_version", &self.protocol_version)
            .field("state", &self.state())
            .finish()
    }
}

/// Releases a channel binding when its SSE stream is dropped.
pub struct ChannelGuard {
    session: Weak<Session>,
    generation: u64,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };

        let released = {
            let mut slot = lock(&session.channel);
            if slot.generation == self.generation {
                slot.sender = None;
                true
            } else {
                false // superseded by a newer bind
            }
        };

        if released {
            let mut state = lock(&session.state);
            if *state == SessionState::Streaming {
                *state = SessionState::Active;
            }
            tracing::debug!(session_id = %session.id, "SSE channel released");
        }
    }
}

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    /// Create a registry with the given idle timeout.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), idle_timeout }
    }

    /// Create a new session for a successful `initialize`.
    pub async fn create(
        &self,
        protocol_version: String,
        client_info: serde_json::Value,
    ) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), protocol_version, client_info));

        self.sessions.write().await.insert(id, Arc::clone(&session));

        tracing::info!(session_id = %session.id, "Created new session");
        session
    }

    /// Look up a live session and record the activity.
    ///
    /// Closed sessions are indistinguishable from unknown ones by design.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        if session.state() == SessionState::Closed {
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Close and remove a session.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.close();
                tracing::info!(session_id = %id, "Closed session");
                true
            }
            None => false,
        }
    }

    /// Close all sessions (server shutdown).
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values() {
            session.close();
        }
        sessions.clear();
    }

    /// Close sessions idle past the timeout. Returns how many were closed.
    pub async fn sweep_idle(&self) -> usize {
        let idle: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.is_idle(self.idle_timeout))
                .map(|(id, _)| id.clone())
                .collect()
        };

        let count = idle.len();
        if count > 0 {
            let mut sessions = self.sessions.write().await;
            for id in idle {
                if let Some(session) = sessions.remove(&id) {
                    session.close();
                    tracing::info!(session_id = %id, "Closed idle session");
                }
            }
        }
        count
    }

    /// Live session count (for monitoring).
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background idle sweep.
    pub fn start_sweep_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let closed = self.sweep_idle().await;
                if closed > 0 {
                    tracing::debug!(count = closed, "Session sweep completed");
                }
            }
        });
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").field("idle_timeout", &self.idle_timeout).finish()
    }
}
