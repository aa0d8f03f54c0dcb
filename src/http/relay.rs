//! HTTP relay to the backend named by a rule.
//!
//! # Responsibilities
//! - Parse a rule destination into scheme, authority and base path
//! - Build the backend request (method, headers, buffered body)
//! - Call the backend through a decoding client and stream the answer back
//!
//! # Design Decisions
//! - One pooled client for the whole process; plain and TLS backends share it
//! - The client's `Accept-Encoding` is replaced by what the decompression
//!   layer can decode, so the relay always hands out identity bodies
//! - One deadline covers connect, headers and body

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::Instant;
use tower::ServiceExt;
use tower_http::decompression::Decompression;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::GatewayError;
use crate::http::request::RequestContext;
use crate::http::response::relay_response;
use crate::routing::RouteTarget;

/// Request headers never forwarded on the HTTP path.
const SKIPPED_REQUEST_HEADERS: [HeaderName; 4] = [
    header::HOST,
    header::CONNECTION,
    header::UPGRADE,
    header::ACCEPT_ENCODING,
];

/// A parsed rule destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// `http` or `https`.
    pub scheme: String,
    /// `host[:port]`, IPv6 literals bracketed.
    pub authority: String,
    /// Path prefix carried by the destination, empty or `/seg[/seg]`.
    pub base_path: String,
}

impl Destination {
    pub fn parse(destination: &str) -> Result<Self, GatewayError> {
        let url = Url::parse(destination).map_err(|e| {
            GatewayError::BackendUnreachable(format!("invalid destination {destination}: {e}"))
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => {
                return Err(GatewayError::BackendUnreachable(format!(
                    "unsupported destination scheme {other}"
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GatewayError::BackendUnreachable(format!("destination {destination} has no host")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    fn path_and_query(&self, target_path: &str, query: Option<&str>) -> String {
        let mut out = format!("{}{}", self.base_path, target_path);
        if let Some(q) = query {
            out.push('?');
            out.push_str(q);
        }
        out
    }

    /// Backend URI for an HTTP request.
    pub fn http_uri(&self, target_path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
        let uri = format!(
            "{}://{}{}",
            self.scheme,
            self.authority,
            self.path_and_query(target_path, query)
        );
        uri.parse()
            .map_err(|e| GatewayError::BackendUnreachable(format!("invalid backend uri {uri}: {e}")))
    }

    /// Backend URL for a WebSocket handshake (`ws` / `wss`).
    pub fn websocket_url(&self, target_path: &str, query: Option<&str>) -> String {
        let scheme = if self.scheme == "https" { "wss" } else { "ws" };
        format!(
            "{}://{}{}",
            scheme,
            self.authority,
            self.path_and_query(target_path, query)
        )
    }
}

/// Copy client headers except `skip`, then point `Host` at the backend.
pub fn forwarded_headers(source: &HeaderMap, authority: &str, skip: &[HeaderName]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if skip.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if let Ok(host) = HeaderValue::from_str(authority) {
        headers.insert(header::HOST, host);
    }
    headers
}

type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Streaming HTTP relay.
#[derive(Clone)]
pub struct RelayClient {
    service: Decompression<BackendClient>,
    relay_timeout: Duration,
    chunk_size: usize,
    max_body_size: usize,
    allow_all_methods: bool,
}

impl RelayClient {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let https = HttpsConnector::new_with_connector(http);

        let client: BackendClient = Client::builder(TokioExecutor::new()).build(https);

        Self {
            service: Decompression::new(client),
            relay_timeout: Duration::from_secs(config.timeouts.relay_secs),
            chunk_size: config.relay.chunk_size,
            max_body_size: config.security.max_body_size,
            allow_all_methods: config.relay.allow_all_methods,
        }
    }

    /// GET and POST always; everything else only when widened by config.
    pub fn check_method(&self, method: &Method) -> Result<(), GatewayError> {
        if self.allow_all_methods || *method == Method::GET || *method == Method::POST {
            Ok(())
        } else {
            Err(GatewayError::UnsupportedMethod(method.clone()))
        }
    }

    /// Relay one request and return the streaming response.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        target: &RouteTarget,
        body: Body,
    ) -> Result<Response<Body>, GatewayError> {
        self.check_method(&ctx.method)?;

        let destination = Destination::parse(&target.destination)?;
        let uri = destination.http_uri(&target.target_path, ctx.query.as_deref())?;

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| GatewayError::RequestBody(e.to_string()))?;

        let mut request = Request::builder()
            .method(ctx.method.clone())
            .uri(uri)
            .body(Body::from(body))
            .map_err(|e| GatewayError::BackendProtocol(e.to_string()))?;
        *request.headers_mut() =
            forwarded_headers(&ctx.headers, &destination.authority, &SKIPPED_REQUEST_HEADERS);

        tracing::debug!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            destination = %target.destination,
            path = %target.target_path,
            "Forwarding request"
        );

        let deadline = Instant::now() + self.relay_timeout;
        let response = match tokio::time::timeout_at(deadline, self.service.clone().oneshot(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_connect() => {
                return Err(GatewayError::BackendUnreachable(format!("{}: {e}", destination.authority)))
            }
            Ok(Err(e)) => return Err(GatewayError::BackendProtocol(e.to_string())),
            Err(_) => return Err(GatewayError::RelayTimeout),
        };

        Ok(relay_response(response, self.chunk_size, deadline))
    }
}
