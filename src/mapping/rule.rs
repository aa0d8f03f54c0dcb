//! A single routing rule and its on-disk record form.
//!
//! On disk a rule is `{ "match_url", "http_dest", "flags" }` where
//! `match_url` packs host and path as `host/path`. In memory the two halves
//! are split so the matcher never re-parses them.

use serde::{Deserialize, Serialize};

/// Flag string that removes a rule from matching.
pub const FLAG_DISABLED: &str = "disabled";
/// Flag string that strips the matched path prefix before forwarding.
pub const FLAG_STRIP_PATH: &str = "strip_path";

/// One entry of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MappingRecord", into = "MappingRecord")]
pub struct Rule {
    /// Host to match. Empty matches any host.
    pub match_host: String,
    /// Path prefix to match, without surrounding slashes. Empty matches any path.
    pub match_path: String,
    /// Backend base URL, `scheme://host[:port][/base]`.
    pub destination: String,
    pub flags: RuleFlags,
}

/// Behaviour flags of a rule.
///
/// Equality looks at meaning only; the loaded spelling order is kept aside
/// so a save writes flags back in the order they were read.
#[derive(Debug, Clone, Default)]
pub struct RuleFlags {
    pub disabled: bool,
    pub strip_path: bool,
    /// Flags this version does not interpret, kept so saves round-trip.
    pub other: Vec<String>,
    loaded: Vec<String>,
}

impl PartialEq for RuleFlags {
    fn eq(&self, other: &Self) -> bool {
        self.disabled == other.disabled
            && self.strip_path == other.strip_path
            && self.other == other.other
    }
}

impl Eq for RuleFlags {}

impl Rule {
    pub fn new(
        match_host: impl Into<String>,
        match_path: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            match_host: match_host.into().trim().to_string(),
            match_path: match_path.into().trim().trim_matches('/').to_string(),
            destination: destination.into().trim().to_string(),
            flags: RuleFlags::default(),
        }
    }

    /// Parse a rule from its packed `match_url` form.
    pub fn from_match_url(
        match_url: &str,
        destination: impl Into<String>,
        flags: &[String],
    ) -> Self {
        let (host, path) = split_match_url(match_url);
        let mut rule = Self::new(host, path, destination);
        rule.flags = RuleFlags::from_strings(flags);
        rule
    }

    pub fn with_strip_path(mut self) -> Self {
        self.flags.strip_path = true;
        self
    }

    pub fn with_disabled(mut self) -> Self {
        self.flags.disabled = true;
        self
    }

    /// A rule without destination can never be selected.
    pub fn is_usable(&self) -> bool {
        !self.destination.is_empty()
    }

    /// Empty host and empty path: matches every request.
    pub fn is_catch_all(&self) -> bool {
        self.match_host.is_empty() && self.match_path.is_empty()
    }

    /// The packed `host/path` form stored on disk.
    pub fn match_url(&self) -> String {
        match (self.match_host.is_empty(), self.match_path.is_empty()) {
            (true, true) => "/".to_string(),
            (false, true) => self.match_host.clone(),
            (_, false) => format!("{}/{}", self.match_host, self.match_path),
        }
    }
}

/// Split `host/path` at the first slash. No slash means host only.
fn split_match_url(match_url: &str) -> (&str, &str) {
    match match_url.trim().split_once('/') {
        Some((host, path)) => (host, path),
        None => (match_url.trim(), ""),
    }
}

impl RuleFlags {
    pub fn from_strings(flags: &[String]) -> Self {
        let mut parsed = Self::default();
        for flag in flags.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
            match flag {
                FLAG_DISABLED => parsed.disabled = true,
                FLAG_STRIP_PATH => parsed.strip_path = true,
                other => parsed.other.push(other.to_string()),
            }
            parsed.loaded.push(flag.to_string());
        }
        parsed
    }

    fn is_set(&self, flag: &str) -> bool {
        match flag {
            FLAG_DISABLED => self.disabled,
            FLAG_STRIP_PATH => self.strip_path,
            other => self.other.iter().any(|o| o == other),
        }
    }

    /// Loaded flags still in effect, in their original order, followed by
    /// flags set since loading.
    pub fn to_strings(&self) -> Vec<String> {
        let mut flags: Vec<String> = self
            .loaded
            .iter()
            .filter(|flag| self.is_set(flag))
            .cloned()
            .collect();

        let added = [
            (self.strip_path, FLAG_STRIP_PATH),
            (self.disabled, FLAG_DISABLED),
        ];
        for (_, flag) in added.iter().filter(|(set, _)| *set) {
            if !flags.iter().any(|f| f == flag) {
                flags.push(flag.to_string());
            }
        }
        for other in &self.other {
            if !flags.contains(other) {
                flags.push(other.clone());
            }
        }
        flags
    }
}

/// Serialized shape of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    #[serde(default)]
    pub match_url: String,
    #[serde(default)]
    pub http_dest: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl From<MappingRecord> for Rule {
    fn from(record: MappingRecord) -> Self {
        Rule::from_match_url(&record.match_url, record.http_dest, &record.flags)
    }
}

impl From<Rule> for MappingRecord {
    fn from(rule: Rule) -> Self {
        MappingRecord {
            match_url: rule.match_url(),
            http_dest: rule.destination,
            flags: rule.flags.to_strings(),
        }
    }
}
