//! Chat session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Author of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting about the document
    User,
    /// The generative model
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange unit in a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A document chat session
///
/// Instances handed out by the store are snapshots; mutating one does not
/// affect the stored session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID (external handle)
    pub id: String,
    /// Ordered conversation, replayed verbatim to the model
    pub transcript: Vec<Turn>,
    /// Reference to the uploaded document, if any
    pub document_uri: Option<String>,
    /// Last successful access
    pub last_seen: Instant,
    /// False once ended
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh, active session
    pub fn new(id: String, now: Instant) -> Self {
        Self {
            id,
            transcript: Vec::new(),
            document_uri: None,
            last_seen: now,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether the session has been idle for longer than `ttl` at `now`
    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }

    /// Whether the session can still be used at `now`
    pub fn is_usable(&self, now: Instant, ttl: std::time::Duration) -> bool {
        self.active && !self.is_expired(now, ttl)
    }

    pub fn has_document(&self) -> bool {
        self.document_uri.is_some()
    }
}
