//! Credential verification.
//!
//! The gateway only needs a yes/no answer for a username and password. The
//! answer comes from a `CredentialVerifier`; the shipped implementation
//! checks the users listed in the configuration file.

use std::collections::HashMap;

use futures_util::future::{self, BoxFuture};
use thiserror::Error;

use crate::config::AuthConfig;

/// Failure to reach a verdict (as opposed to a rejected password).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

/// Decides whether a username/password pair is valid.
pub trait CredentialVerifier: Send + Sync {
    fn verify<'a>(&'a self, username: &'a str, password: &'a str) -> BoxFuture<'a, Result<bool, AuthError>>;
}

/// Users from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            users: users
                .into_iter()
                .map(|(u, p)| (u.into().trim().to_string(), p.into()))
                .collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config
                .users
                .iter()
                .map(|user| (user.username.clone(), user.password.clone())),
        )
    }

    fn check(&self, username: &str, password: &str) -> bool {
        match self.users.get(username.trim()) {
            Some(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
            None => false,
        }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify<'a>(&'a self, username: &'a str, password: &'a str) -> BoxFuture<'a, Result<bool, AuthError>> {
        Box::pin(future::ready(Ok(self.check(username, password))))
    }
}

/// Byte comparison whose duration does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
