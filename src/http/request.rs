//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract routing-relevant information (host, path, upgrade intent)
//! - Normalize host and path once, before any rule is evaluated
//! - Carry the request ID header name shared by the middleware stack
//!
//! # Design Decisions
//! - The context is built once per request and passed explicitly; nothing
//!   about the request lives in global state
//! - Matching uses the normalized path, forwarding uses the raw path so
//!   backends see trailing slashes exactly as the client sent them

use axum::http::{header, request::Parts, HeaderMap, HeaderName, Method};
use percent_encoding::percent_decode_str;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Everything the router and relays need to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Lowercased host, port removed.
    pub host: String,
    /// Percent-decoded, single leading slash, no trailing slash (root stays
    /// `/`). Used for matching.
    pub path: String,
    /// Single leading slash, otherwise as received. Used for forwarding.
    pub raw_path: String,
    pub query: Option<String>,
    pub method: Method,
    pub headers: HeaderMap,
    /// Client asked for a WebSocket upgrade.
    pub upgrade: bool,
    pub request_id: String,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let host_header = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default();

        let request_id = parts
            .headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            host: normalize_host(&host_header),
            path: normalize_path(&percent_decode_str(parts.uri.path()).decode_utf8_lossy()),
            raw_path: single_leading_slash(parts.uri.path()),
            query: parts.uri.query().map(str::to_string),
            method: parts.method.clone(),
            headers: parts.headers.clone(),
            upgrade: is_websocket_upgrade(&parts.headers),
            request_id,
        }
    }

    /// Raw path plus query string, as sent to the login page.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.raw_path, q),
            None => self.raw_path.clone(),
        }
    }
}

/// Drop a trailing `:port` and lowercase. Bracketed IPv6 literals keep their
/// brackets.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.to_ascii_lowercase()
}

/// Single leading slash, no trailing slash, root stays `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn single_leading_slash(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// `Upgrade: websocket` plus a `Connection` header listing `upgrade`, both
/// case-insensitive.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let has_upgrade_ws = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let has_connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("upgrade"));
    has_upgrade_ws && has_connection_upgrade
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn parts(req: Request<Body>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn host_port_is_stripped() {
        assert_eq!(normalize_host("app.test:8443"), "app.test");
        assert_eq!(normalize_host("App.Test"), "app.test");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host("[::1]"), "[::1]");
        assert_eq!(normalize_host(""), "");
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("//"), "/");
        assert_eq!(normalize_path("/api/"), "/api");
        assert_eq!(normalize_path("api/v1"), "/api/v1");
        assert_eq!(normalize_path("//api//"), "/api");
    }

    #[test]
    fn context_from_request() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/app/items/?page=2")
            .header("Host", "Media.Example.com:443")
            .header("x-request-id", "abc")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req));

        assert_eq!(ctx.host, "media.example.com");
        assert_eq!(ctx.path, "/app/items");
        assert_eq!(ctx.raw_path, "/app/items/");
        assert_eq!(ctx.query.as_deref(), Some("page=2"));
        assert_eq!(ctx.path_and_query(), "/app/items/?page=2");
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.request_id, "abc");
        assert!(!ctx.upgrade);
    }

    #[test]
    fn matching_path_is_decoded_raw_path_is_not() {
        let req = Request::builder()
            .uri("/caf%C3%A9/my%20app/")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req));
        assert_eq!(ctx.path, "/café/my app");
        assert_eq!(ctx.raw_path, "/caf%C3%A9/my%20app/");
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        let req = Request::builder()
            .uri("http://Other.Test:8080/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RequestContext::from_parts(&parts(req)).host, "other.test");
    }

    #[test]
    fn websocket_upgrade_detection() {
        let req = Request::builder()
            .uri("/ws")
            .header("Upgrade", "WebSocket")
            .header("Connection", "keep-alive, Upgrade")
            .body(Body::empty())
            .unwrap();
        assert!(RequestContext::from_parts(&parts(req)).upgrade);

        let req = Request::builder()
            .uri("/ws")
            .header("Upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        assert!(!RequestContext::from_parts(&parts(req)).upgrade);

        let req = Request::builder()
            .uri("/ws")
            .header("Upgrade", "h2c")
            .header("Connection", "Upgrade")
            .body(Body::empty())
            .unwrap();
        assert!(!RequestContext::from_parts(&parts(req)).upgrade);
    }
}
