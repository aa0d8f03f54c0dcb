//! Error types surfaced by the request path.
//!
//! Every failure the relay can hit maps to one variant; the variant decides
//! the status code. Details are logged, never sent to the client, so backend
//! topology does not leak.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure outcomes of routing and relaying a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No enabled rule matched the request.
    #[error("no mapping rule matched the request")]
    NoMatchingRule,

    /// The relay refuses this method.
    #[error("method {0} is not supported by the relay")]
    UnsupportedMethod(Method),

    /// The backend could not be reached (connect failure, bad destination).
    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The backend answered with something we cannot relay.
    #[error("backend protocol error: {0}")]
    BackendProtocol(String),

    /// The backend went away mid-relay.
    #[error("upstream disconnected: {0}")]
    UpstreamDisconnected(String),

    /// The relay exceeded its time budget.
    #[error("relay exceeded its time budget")]
    RelayTimeout,

    /// The client request body could not be read.
    #[error("request body rejected: {0}")]
    RequestBody(String),

    /// The mapping table could not be read or written.
    #[error("mapping table unavailable: {0}")]
    ConfigurationUnavailable(String),
}

impl GatewayError {
    /// Status code surfaced to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoMatchingRule => StatusCode::NOT_FOUND,
            GatewayError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RequestBody(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BackendUnreachable(_)
            | GatewayError::BackendProtocol(_)
            | GatewayError::UpstreamDisconnected(_)
            | GatewayError::RelayTimeout
            | GatewayError::ConfigurationUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short fixed phrase used as the response body.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::NoMatchingRule => "App not found",
            GatewayError::UnsupportedMethod(_) => "Method not allowed",
            GatewayError::RequestBody(_) => "Request body too large",
            _ => "Internal Server Error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Relay failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }
        (status, self.public_message()).into_response()
    }
}
