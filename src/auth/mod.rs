//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! POST /login (username, password)
//!     → credentials.rs (CredentialVerifier decides)
//!     → session.rs (issue token, remember username + expiry)
//!     → Set-Cookie: <cookie_name>=<token>
//!
//! Every proxied request:
//!     → gate.rs (cookie → token → live session?) → bool for the router
//! ```
//!
//! # Design Decisions
//! - The gate is a pure read: no network calls, no session refresh
//! - Sessions live in memory; a restart logs everyone out

pub mod credentials;
pub mod gate;
pub mod handlers;
pub mod session;

pub use credentials::{constant_time_eq, AuthError, CredentialVerifier, StaticCredentials};
pub use gate::{CookieSettings, SessionGate};
pub use session::{Session, SessionStore};
