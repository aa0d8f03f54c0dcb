//! Mapping table subsystem.
//!
//! # Data Flow
//! ```text
//! mappings.json (ordered rules)
//!     → store.rs (RuleSource::load, fresh per request)
//!     → rule.rs (record → Rule: split host/path, parse flags)
//!     → Arc<Vec<Rule>> handed to the router for this request only
//!
//! Admin edits:
//!     store.rs edit() → load → mutate → save (temp file + rename)
//! ```
//!
//! # Design Decisions
//! - No caching across requests; the next request sees the latest save
//! - Order is the contract; nothing sorts or deduplicates rules

pub mod rule;
pub mod store;

pub use rule::{MappingRecord, Rule, RuleFlags};
pub use store::{JsonFileSource, MappingStore, MemorySource, RuleSource, StoreError};
