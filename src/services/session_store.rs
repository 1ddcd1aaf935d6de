//! In-memory chat session store
//!
//! Sessions live in a single map guarded by one mutex. Every operation is a
//! short critical section; nothing awaits external I/O while holding the lock.
//!
//! Expiry is evaluated lazily: each lookup first sweeps out sessions that were
//! ended or have been idle for longer than the TTL. A background sweeper can be
//! attached with [`SessionStore::spawn_sweeper`] to reclaim memory while the
//! service is idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{Session, Turn};

/// Errors raised by the session store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The id never existed, was ended, or expired. The causes are
    /// deliberately indistinguishable.
    #[error("invalid_or_expired_session")]
    NotFound,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Shared store of chat sessions
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store; `ttl` is clamped to at least one second
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: ttl.max(Duration::from_secs(1)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a new session and return its id
    pub async fn create(&self) -> String {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        Self::sweep(&mut sessions, now, self.ttl);

        let mut id = Uuid::new_v4().to_string();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        sessions.insert(id.clone(), Session::new(id.clone(), now));
        tracing::debug!(session_id = %id, "session created");
        id
    }

    /// Snapshot of a usable session
    pub async fn get(&self, id: &str) -> SessionResult<Session> {
        self.with_session(id, |session, _| session.clone()).await
    }

    /// Refresh the idle timer
    pub async fn touch(&self, id: &str) -> SessionResult<()> {
        self.with_session(id, |session, now| session.last_seen = now)
            .await
    }

    /// Record (or replace) the uploaded document reference
    pub async fn set_document_uri(&self, id: &str, uri: impl Into<String>) -> SessionResult<()> {
        let uri = uri.into();
        self.with_session(id, move |session, now| {
            session.document_uri = Some(uri);
            session.last_seen = now;
        })
        .await
    }

    pub async fn append_user_turn(&self, id: &str, text: impl Into<String>) -> SessionResult<()> {
        self.append(id, Turn::user(text)).await
    }

    pub async fn append_model_turn(&self, id: &str, text: impl Into<String>) -> SessionResult<()> {
        self.append(id, Turn::model(text)).await
    }

    async fn append(&self, id: &str, turn: Turn) -> SessionResult<()> {
        self.with_session(id, move |session, now| {
            session.transcript.push(turn);
            session.last_seen = now;
        })
        .await
    }

    /// End a session. Unknown ids are ignored.
    pub async fn end(&self, id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(id) {
            session.active = false;
            session.transcript.clear();
            session.document_uri = None;
            tracing::debug!(session_id = %id, "session ended");
        }
    }

    /// Remove every ended or expired session, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        Self::sweep(&mut sessions, Instant::now(), self.ttl)
    }

    /// Number of sessions held in memory, including ones not yet swept
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Drop all sessions, returning how many were held
    pub async fn shutdown(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        tracing::info!(count, "session store shut down");
        count
    }

    /// Periodically purge expired sessions until the returned task is aborted
    pub fn spawn_sweeper(store: Arc<SessionStore>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = store.purge_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired sessions");
                }
            }
        })
    }

    /// Sweep, then run `f` against the session if it is still usable
    async fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session, Instant) -> T,
    ) -> SessionResult<T> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        Self::sweep(&mut sessions, now, self.ttl);

        match sessions.get_mut(id) {
            Some(session) if session.active => Ok(f(session, now)),
            _ => Err(SessionError::NotFound),
        }
    }

    fn sweep(sessions: &mut HashMap<String, Session>, now: Instant, ttl: Duration) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| session.is_usable(now, ttl));
        before - sessions.len()
    }
}
