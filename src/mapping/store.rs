//! Mapping table persistence and per-request access.
//!
//! # Responsibilities
//! - Load the ordered rule table fresh on every request
//! - Keep the last successfully loaded table for read failures
//! - Serialize edits (load, mutate, save) behind a writer lock
//!
//! # Design Decisions
//! - Storage sits behind `RuleSource` so callers can inject a fixed table
//! - Read failures never reach the request path; they degrade to the last
//!   known table (empty before the first successful read)
//! - Saves go through a temp file and a rename, so readers never observe a
//!   half-written table

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use futures_util::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::mapping::rule::Rule;

/// Version tag written into the mapping file.
pub const MAPPING_FILE_VERSION: &str = "1.0";

/// Error type for rule persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mapping file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Backing storage for the rule table.
pub trait RuleSource: Send + Sync {
    /// Read the whole table, in order.
    fn load(&self) -> BoxFuture<'_, Result<Vec<Rule>, StoreError>>;

    /// Replace the whole table, preserving order.
    fn save<'a>(&'a self, rules: &'a [Rule]) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

#[derive(Deserialize)]
struct MappingFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    mappings: Vec<Rule>,
}

#[derive(Serialize)]
struct MappingFileRef<'a> {
    version: &'static str,
    mappings: &'a [Rule],
}

/// Rule table stored as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> StoreError {
        StoreError::Json {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Mapping file absent, table is empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let file: MappingFile = serde_json::from_str(&text).map_err(|e| self.json_error(e))?;
        if file.version != MAPPING_FILE_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = %file.version,
                "Unknown mapping file version"
            );
        }
        Ok(file.mappings)
    }

    async fn write_rules(&self, rules: &[Rule]) -> Result<(), StoreError> {
        let document = MappingFileRef {
            version: MAPPING_FILE_VERSION,
            mappings: rules,
        };
        let text = serde_json::to_string_pretty(&document).map_err(|e| self.json_error(e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, text).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

impl RuleSource for JsonFileSource {
    fn load(&self) -> BoxFuture<'_, Result<Vec<Rule>, StoreError>> {
        Box::pin(self.read_rules())
    }

    fn save<'a>(&'a self, rules: &'a [Rule]) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.write_rules(rules))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Rule table held in memory. Used when embedding the gateway and in tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    rules: RwLock<Vec<Rule>>,
}

impl MemorySource {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Replace the table, as an external editor would.
    pub fn replace(&self, rules: Vec<Rule>) {
        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = rules;
    }
}

impl RuleSource for MemorySource {
    fn load(&self) -> BoxFuture<'_, Result<Vec<Rule>, StoreError>> {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner()).clone();
        Box::pin(future::ready(Ok(rules)))
    }

    fn save<'a>(&'a self, rules: &'a [Rule]) -> BoxFuture<'a, Result<(), StoreError>> {
        self.replace(rules.to_vec());
        Box::pin(future::ready(Ok(())))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Per-request view of the mapping table.
pub struct MappingStore {
    source: Arc<dyn RuleSource>,
    last_good: ArcSwap<Vec<Rule>>,
    writer: Mutex<()>,
}

impl MappingStore {
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        Self {
            source,
            last_good: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Store backed by a JSON file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileSource::new(path)))
    }

    /// Current table. Always reads the source; on failure logs and returns
    /// the last table that loaded successfully.
    pub async fn list(&self) -> Arc<Vec<Rule>> {
        match self.source.load().await {
            Ok(rules) => {
                let rules = Arc::new(rules);
                self.last_good.store(Arc::clone(&rules));
                rules
            }
            Err(e) => {
                let fallback = self.last_good.load_full();
                tracing::error!(
                    source = %self.source.describe(),
                    error = %e,
                    fallback_rules = fallback.len(),
                    "Failed to load mapping table"
                );
                fallback
            }
        }
    }

    /// Load, mutate and save the table as one step.
    ///
    /// Writers are serialized; readers are never blocked. A table that fails
    /// to load is not edited, so a corrupt file is never overwritten blindly.
    pub async fn edit<T, E, F>(&self, f: F) -> Result<(Arc<Vec<Rule>>, T), E>
    where
        F: FnOnce(&mut Vec<Rule>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.writer.lock().await;

        let mut rules = self.source.load().await?;
        let output = f(&mut rules)?;
        self.source.save(&rules).await?;

        let rules = Arc::new(rules);
        self.last_good.store(Arc::clone(&rules));
        tracing::info!(source = %self.source.describe(), rules = rules.len(), "Mapping table saved");
        Ok((rules, output))
    }
}
