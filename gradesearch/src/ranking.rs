//! Result merging and ordering
//!
//! Rows are compared by normalized relevance first: source precedence
//! (indexed, then substring, then fuzzy), then score within a source. Ties fall
//! to population (descending) and finally the entity key, so the order is total
//! and deterministic.

use crate::interface::{EntityKey, SearchResult};
use std::cmp::Ordering;
use std::collections::HashMap;

/// `Less` means `a` sorts before `b` (is the better row).
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.relevance()
        .cmp_quality(&a.relevance())
        .then_with(|| b.population().cmp(&a.population()))
        .then_with(|| a.key().cmp(&b.key()))
}

/// Union of several tiers' rows, one row per entity, keeping the best relevance.
pub fn merge_tier_rows(tiers: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut best: HashMap<EntityKey, SearchResult> = HashMap::new();
    for row in tiers.into_iter().flatten() {
        match best.get(&row.key()) {
            Some(existing) if existing.relevance().cmp_quality(&row.relevance()) != Ordering::Less => {}
            _ => {
                best.insert(row.key(), row);
            }
        }
    }
    best.into_values().collect()
}

/// Sort best first and truncate to `limit`
pub fn rank_category(mut rows: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    rows.sort_by(compare_results);
    rows.truncate(limit);
    rows
}

/// True when no adjacent pair is out of order
pub fn is_ranked(rows: &[SearchResult]) -> bool {
    rows.windows(2)
        .all(|pair| compare_results(&pair[0], &pair[1]) != Ordering::Greater)
}
