//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact match, case-insensitive, port already stripped)
//! - Match path prefix (case-sensitive, plain string prefix of the decoded path)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110 host names)
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching
//! - Matchers borrow from the rule; the table is rebuilt per request so
//!   nothing is compiled ahead of time

use percent_encoding::percent_decode_str;

use crate::http::request::RequestContext;
use crate::mapping::Rule;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, ctx: &RequestContext) -> bool;
}

/// Matches the normalized request host.
#[derive(Debug, Clone, Copy)]
pub struct HostMatcher<'a> {
    expected_host: &'a str,
}

impl<'a> HostMatcher<'a> {
    pub fn new(host: &'a str) -> Self {
        Self {
            expected_host: host,
        }
    }
}

impl Matcher for HostMatcher<'_> {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.expected_host.is_empty() || self.expected_host.eq_ignore_ascii_case(&ctx.host)
    }
}

/// Matches the normalized request path against `/<prefix>`.
#[derive(Debug, Clone, Copy)]
pub struct PathPrefixMatcher<'a> {
    prefix: &'a str,
}

impl<'a> PathPrefixMatcher<'a> {
    /// `prefix` carries no leading or trailing slash.
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }
}

impl Matcher for PathPrefixMatcher<'_> {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.prefix.is_empty() || strip_path_prefix(&ctx.path, self.prefix).is_some()
    }
}

/// Host AND path of one rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher<'a> {
    host: HostMatcher<'a>,
    path: PathPrefixMatcher<'a>,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(rule: &'a Rule) -> Self {
        Self {
            host: HostMatcher::new(&rule.match_host),
            path: PathPrefixMatcher::new(&rule.match_path),
        }
    }
}

impl Matcher for RuleMatcher<'_> {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.host.matches(ctx) && self.path.matches(ctx)
    }
}

/// If decoded `path` starts with `/<prefix>`, return what follows.
pub fn strip_path_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    path.strip_prefix('/')?.strip_prefix(prefix)
}

/// Same as [`strip_path_prefix`] for a still percent-encoded path: the
/// shortest encoded head that decodes to `/<prefix>` is removed.
pub fn strip_encoded_prefix<'p>(raw: &'p str, prefix: &str) -> Option<&'p str> {
    if let Some(rest) = strip_path_prefix(raw, prefix) {
        return Some(rest);
    }
    let wanted = format!("/{prefix}");
    (1..=raw.len())
        .filter(|end| raw.is_char_boundary(*end))
        .find(|end| percent_decode_str(&raw[..*end]).decode_utf8_lossy() == wanted)
        .map(|end| &raw[end..])
}
