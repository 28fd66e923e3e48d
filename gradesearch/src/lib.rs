//! Grade Search - query engine for grade-distribution browsing
//!
//! Classifies free-text queries, retrieves courses, professors and departments
//! from a SQLite FTS5 index with a substring fallback, fuzzy-reranks sparse
//! results and caches responses under bounded memory.
//!
//! # Architecture
//! - `classifier`: Query shape detection and FTS5 pattern rewriting
//! - `database`: Read-only SQLite access, substring tier, fixture writes
//! - `indexer`: FTS5 tier and offline index rebuild
//! - `ranking`: Cross-tier merge and deterministic ordering
//! - `fuzzy`: Similarity-based injection for sparse results
//! - `cache`: LRU stores for search and detail responses
//! - `store`: The async pipeline behind `GradeSearchApi`
//! - `api`: Status, header and body mapping for the HTTP layer

pub mod api;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod database;
pub mod demo;
pub mod fuzzy;
pub mod indexer;
pub mod interface;
pub mod models;
pub mod ranking;
mod store;

pub use config::SearchConfig;
pub use interface::*;
pub use store::GradeStore;
