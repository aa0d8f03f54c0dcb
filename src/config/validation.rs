//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chunk size > 0)
//! - Validate addresses and schemes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("auth.login_scheme must be http or https, got '{0}'")]
    InvalidLoginScheme(String),

    #[error("auth.cookie_name must not be empty")]
    EmptyCookieName,

    #[error("auth.users[{0}] has an empty username")]
    EmptyUsername(usize),
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.relay.chunk_size == 0 {
        errors.push(ValidationError::MustBePositive { field: "relay.chunk_size" });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "timeouts.connect_secs" });
    }
    if config.timeouts.relay_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "timeouts.relay_secs" });
    }
    if config.auth.session_ttl_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "auth.session_ttl_secs" });
    }

    let scheme = config.auth.login_scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        errors.push(ValidationError::InvalidLoginScheme(config.auth.login_scheme.clone()));
    }

    if config.auth.cookie_name.trim().is_empty() {
        errors.push(ValidationError::EmptyCookieName);
    }

    for (i, user) in config.auth.users.iter().enumerate() {
        if user.username.trim().is_empty() {
            errors.push(ValidationError::EmptyUsername(i));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
