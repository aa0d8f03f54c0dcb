//! In-memory session table.
//!
//! Tokens are random UUIDs; the store maps each to the user it was issued
//! for and the instant it stops being valid.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::AuthConfig;

/// One logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub expires_at: Instant,
}

impl Session {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Concurrent token → session map.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(Duration::from_secs(config.session_ttl_secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session for `username` and return its token.
    pub fn issue(&self, username: &str) -> String {
        self.prune_expired();

        let token = Uuid::new_v4().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        tracing::info!(username = %username, "Session issued");
        token
    }

    /// The live session behind `token`, if any. Never mutates the table.
    pub fn lookup(&self, token: &str) -> Option<Session> {
        let now = Instant::now();
        self.sessions
            .get(token)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value().clone())
    }

    /// End a session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every expired session, returning how many went away.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.is_live(now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
