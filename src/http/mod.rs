//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, reserved endpoints, middleware)
//!     → request.rs (RequestContext: host, paths, upgrade intent)
//!     → [routing layer decides rule and target path]
//!     → relay.rs (plain HTTP) | websocket.rs (upgrade)
//!     → response.rs (header cleanup, chunked streaming)
//!     → Send to client
//! ```

pub mod relay;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use relay::{Destination, RelayClient};
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use websocket::WebSocketRelay;
