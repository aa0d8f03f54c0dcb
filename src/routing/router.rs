//! Route lookup and dispatch decision.
//!
//! # Responsibilities
//! - Scan the mapping table in order and pick the first usable match
//! - Turn an unauthenticated match into a login redirect
//! - Compute the forwarded path (optional prefix strip)
//!
//! # Design Decisions
//! - Pure: table and authentication state are inputs, nothing is cached
//! - O(n) scan in table order; position is the only tie-break
//! - Explicit NotFound rather than a silent default

use crate::config::AuthConfig;
use crate::http::request::RequestContext;
use crate::mapping::Rule;
use crate::routing::matcher::{strip_encoded_prefix, Matcher, RuleMatcher};

/// Where an authenticated, matched request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Position of the winning rule in the table.
    pub rule_index: usize,
    /// Backend base URL of the winning rule.
    pub destination: String,
    /// Path to request from the backend.
    pub target_path: String,
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow(RouteTarget),
    /// Matched, but the caller must log in first.
    Redirect { location: String },
    NotFound,
}

/// Builds login URLs carrying the page to return to.
#[derive(Debug, Clone, Default)]
pub struct LoginRedirect {
    /// `scheme://host` of the login page; empty means same host, relative URL.
    base: String,
}

impl LoginRedirect {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        match auth.login_domain.as_deref().map(str::trim) {
            Some(domain) if domain.starts_with("http://") || domain.starts_with("https://") => {
                Self::new(domain)
            }
            Some(domain) if !domain.is_empty() => {
                Self::new(format!("{}://{}", auth.login_scheme.to_ascii_lowercase(), domain))
            }
            _ => Self::default(),
        }
    }

    /// Login URL with `next` percent-encoded.
    pub fn url(&self, next: &str) -> String {
        let next: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
        format!("{}/login?next={}", self.base, next)
    }
}

/// First-match router over an ordered rule table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    login: LoginRedirect,
}

impl Router {
    pub fn new(login: LoginRedirect) -> Self {
        Self { login }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(LoginRedirect::from_config(auth))
    }

    /// Lowest-index rule that is enabled, has a destination, and matches.
    pub fn find<'r>(&self, ctx: &RequestContext, rules: &'r [Rule]) -> Option<(usize, &'r Rule)> {
        rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| !rule.flags.disabled && rule.is_usable())
            .find(|(_, rule)| RuleMatcher::new(rule).matches(ctx))
    }

    /// Decide what to do with a request.
    pub fn route(&self, ctx: &RequestContext, rules: &[Rule], authenticated: bool) -> RouteDecision {
        let Some((rule_index, rule)) = self.find(ctx, rules) else {
            return RouteDecision::NotFound;
        };

        if !authenticated {
            return RouteDecision::Redirect {
                location: self.login.url(&ctx.path_and_query()),
            };
        }

        RouteDecision::Allow(RouteTarget {
            rule_index,
            destination: rule.destination.clone(),
            target_path: target_path(rule, &ctx.raw_path),
        })
    }
}

/// Forwarded path for a matched rule. Only the matched prefix is removed; the
/// remainder always keeps a leading slash.
fn target_path(rule: &Rule, raw_path: &str) -> String {
    if !rule.flags.strip_path || rule.match_path.is_empty() {
        return raw_path.to_string();
    }
    match strip_encoded_prefix(raw_path, &rule.match_path) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        Some(rest) => format!("/{rest}"),
        None => raw_path.to_string(),
    }
}
