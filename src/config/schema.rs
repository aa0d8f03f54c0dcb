//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where the ordered mapping table lives.
    pub mappings: MappingsConfig,

    /// Login flow and session settings.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// HTTP relay behaviour.
    pub relay: RelayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Location of the persisted mapping table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingsConfig {
    /// Path to the JSON rule table. Re-read on every request.
    pub path: String,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            path: "config/mappings.json".to_string(),
        }
    }
}

/// Login flow, session cookie and admin access settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Host serving the login form. Unset means "same host as the request".
    pub login_domain: Option<String>,

    /// Scheme prefixed to `login_domain` when it carries none.
    pub login_scheme: String,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Optional `Domain` attribute for the session cookie.
    pub cookie_domain: Option<String>,

    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,

    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,

    /// Users allowed to edit the mapping table. Empty means every
    /// authenticated user.
    pub admin_users: Vec<String>,

    /// Bearer token accepted by the admin API.
    pub api_key: Option<String>,

    /// Static credentials checked by the built-in verifier.
    pub users: Vec<UserCredential>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_domain: None,
            login_scheme: "http".to_string(),
            cookie_name: "authgate_session".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            session_ttl_secs: 3600,
            admin_users: Vec::new(),
            api_key: None,
            users: Vec::new(),
        }
    }
}

/// A username/password pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Ceiling for one HTTP relay (connect, headers and body) in seconds.
    pub relay_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            relay_secs: 300,
        }
    }
}

/// HTTP relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Largest chunk handed to the client at once, in bytes.
    pub chunk_size: usize,

    /// Relay every method instead of only GET and POST.
    pub allow_all_methods: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            allow_all_methods: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}
