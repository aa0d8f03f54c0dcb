//! authgate: an authenticating reverse proxy driven by an ordered mapping table.

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod mapping;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
