//! Session cookie handling and the authentication predicate.
//!
//! # Responsibilities
//! - Find the session token in the request's `Cookie` headers
//! - Answer "is this request authenticated?" for the router
//! - Build the `Set-Cookie` values for login and logout
//!
//! # Design Decisions
//! - The predicate never mutates the session table
//! - Cookie attributes come from configuration only

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::auth::session::{Session, SessionStore};
use crate::config::AuthConfig;
use crate::http::request::RequestContext;

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

/// Attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub max_age_secs: u64,
}

impl CookieSettings {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            domain: config.cookie_domain.clone().filter(|d| !d.trim().is_empty()),
            secure: config.cookie_secure,
            max_age_secs: config.session_ttl_secs,
        }
    }

    fn render(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name, value, max_age
        );
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value carrying a fresh token.
    pub fn issue(&self, token: &str) -> String {
        self.render(token, self.max_age_secs)
    }

    /// `Set-Cookie` value that removes the cookie.
    pub fn clear(&self) -> String {
        self.render("", 0)
    }
}

/// Decides whether a request carries a live session.
#[derive(Debug, Clone)]
pub struct SessionGate {
    cookie_name: String,
    sessions: Arc<SessionStore>,
}

impl SessionGate {
    pub fn new(cookie_name: impl Into<String>, sessions: Arc<SessionStore>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            sessions,
        }
    }

    pub fn token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        cookie_value(headers, &self.cookie_name).filter(|t| !t.is_empty())
    }

    pub fn session(&self, headers: &HeaderMap) -> Option<Session> {
        self.token(headers).and_then(|token| self.sessions.lookup(token))
    }

    pub fn is_authenticated(&self, ctx: &RequestContext) -> bool {
        self.session(&ctx.headers).is_some()
    }
}
