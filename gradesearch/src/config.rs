//! Search tuning knobs, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum rows per category in a response
    pub per_category_cap: usize,
    /// Fuzzy reranking runs when the merged total is below this
    pub fuzzy_min_results: usize,
    /// Entities per category scored by the fuzzy reranker
    pub fuzzy_pool_size: usize,
    pub fuzzy_similarity_threshold: f64,
    pub search_cache_capacity: usize,
    pub detail_cache_capacity: usize,
    pub step_timeout_ms: u64,
    /// `max-age` for autocomplete responses to department-prefix shaped input
    pub autocomplete_prefix_max_age_secs: u64,
    pub autocomplete_max_age_secs: u64,
    pub db_pool_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_category_cap: 10,
            fuzzy_min_results: 3,
            fuzzy_pool_size: 50,
            fuzzy_similarity_threshold: 0.88,
            search_cache_capacity: 50,
            detail_cache_capacity: 100,
            step_timeout_ms: 2000,
            autocomplete_prefix_max_age_secs: 3600,
            autocomplete_max_age_secs: 300,
            db_pool_size: 4,
        }
    }
}

impl SearchConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"per_category_cap": 5, "step_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.per_category_cap, 5);
        assert_eq!(config.step_timeout(), Duration::from_millis(250));
        assert_eq!(config.search_cache_capacity, 50);
        assert_eq!(config.detail_cache_capacity, 100);
        assert!((config.fuzzy_similarity_threshold - 0.88).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, r#"{"fuzzy_min_results": 1}"#).unwrap();

        let config = SearchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.fuzzy_min_results, 1);
        assert_eq!(config.fuzzy_pool_size, 50);

        assert!(SearchConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
