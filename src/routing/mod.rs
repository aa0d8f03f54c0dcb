//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers)
//!     → RequestContext (host without port, normalized path)
//!     → router.rs (ordered scan of this request's table snapshot)
//!     → matcher.rs (evaluate host AND path-prefix)
//!     → Return: Allow(target) | Redirect(login) | NotFound
//! ```
//!
//! # Design Decisions
//! - Table loaded per request, never compiled or cached
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (table order)

pub mod matcher;
pub mod router;

pub use router::{LoginRedirect, RouteDecision, RouteTarget, Router};
