//! Fuzzy reranking for sparse results
//!
//! When a search returns fewer rows than the configured minimum, the most
//! populous entities of each target category are scored against the query and
//! close matches are appended. Existing rows are never removed or reordered.

use crate::config::SearchConfig;
use crate::interface::{Category, Relevance, SearchResponse, SearchResult};

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Similarity of `query` to `text` in `[0, 1]`.
///
/// The better of: normalized Damerau-Levenshtein over both strings with
/// whitespace removed, and the mean over query tokens of their best
/// Jaro-Winkler match among the text's tokens.
pub fn similarity(query: &str, text: &str) -> f64 {
    let query_compact: String = query.to_lowercase().split_whitespace().collect();
    let text_compact: String = text.to_lowercase().split_whitespace().collect();
    if query_compact.is_empty() || text_compact.is_empty() {
        return 0.0;
    }
    let whole = strsim::normalized_damerau_levenshtein(&query_compact, &text_compact);

    let query_tokens = tokens(query);
    let text_tokens = tokens(text);
    let token_wise = if query_tokens.is_empty() || text_tokens.is_empty() {
        0.0
    } else {
        let total: f64 = query_tokens
            .iter()
            .map(|q| {
                text_tokens
                    .iter()
                    .map(|t| strsim::jaro_winkler(q, t))
                    .fold(0.0, f64::max)
            })
            .sum();
        total / query_tokens.len() as f64
    };

    whole.max(token_wise)
}

/// Best similarity over the texts a row is known by
pub fn best_similarity(query: &str, result: &SearchResult) -> f64 {
    result
        .match_texts()
        .iter()
        .map(|text| similarity(query, text))
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyReranker {
    min_results: usize,
    threshold: f64,
    per_category_cap: usize,
}

impl FuzzyReranker {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            min_results: config.fuzzy_min_results,
            threshold: config.fuzzy_similarity_threshold,
            per_category_cap: config.per_category_cap,
        }
    }

    pub fn should_rerank(&self, response: &SearchResponse) -> bool {
        response.total() < self.min_results
    }

    /// Append pool entries at or above the threshold that are not already present,
    /// best similarity first, without exceeding the per-category cap.
    /// Returns how many rows were added.
    pub fn inject(
        &self,
        normalized_query: &str,
        category: Category,
        pool: Vec<SearchResult>,
        response: &mut SearchResponse,
    ) -> usize {
        let room = self.per_category_cap.saturating_sub(response.len_of(category));
        if room == 0 {
            return 0;
        }

        let mut scored: Vec<(f64, SearchResult)> = pool
            .into_iter()
            .filter(|candidate| candidate.category() == category && !response.contains(&candidate.key()))
            .filter_map(|candidate| {
                let score = best_similarity(normalized_query, &candidate);
                (score >= self.threshold).then_some((score, candidate))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| b.population().cmp(&a.population()))
                .then_with(|| a.key().cmp(&b.key()))
        });
        scored.dedup_by(|(_, a), (_, b)| a.key() == b.key());

        let mut added = 0;
        for (score, mut candidate) in scored.into_iter().take(room) {
            candidate.set_relevance(Relevance::fuzzy(score));
            response.push(candidate);
            added += 1;
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{DepartmentResult, MatchSource};

    fn department(abbr: &str, name: &str, students: i64) -> SearchResult {
        SearchResult::Department(DepartmentResult {
            dept_abbr: abbr.into(),
            dept_name: name.into(),
            total_students: students,
            summary: None,
            relevance: Relevance::fuzzy(0.0),
        })
    }

    fn reranker() -> FuzzyReranker {
        FuzzyReranker::new(&SearchConfig::default())
    }

    #[test]
    fn test_similarity_tolerates_typos() {
        assert!(similarity("chemstry", "Chemistry") >= 0.88);
        assert!(similarity("intro to computing", "Introduction to Computing") >= 0.88);
        assert!(similarity("cs1301", "CS 1301") > 0.99);
        assert!(similarity("chemstry", "Computer Science") < 0.88);
        assert_eq!(similarity("", "anything"), 0.0);
    }

    #[test]
    fn test_inject_appends_close_matches_only() {
        let mut response = SearchResponse::default();
        let pool = vec![
            department("CS", "Computer Science", 5000),
            department("CHEM", "Chemistry", 1200),
            department("MATH", "Mathematics", 4000),
        ];

        let added = reranker().inject("chemstry", Category::Department, pool, &mut response);
        assert_eq!(added, 1);
        assert_eq!(response.departments[0].dept_abbr, "CHEM");
        assert_eq!(response.departments[0].relevance.source, MatchSource::Fuzzy);
        assert!(response.departments[0].relevance.score >= 0.88);
    }

    #[test]
    fn test_inject_never_reorders_or_duplicates() {
        let mut response = SearchResponse::default();
        response.push(department("CHEM", "Chemistry", 1200));
        response.departments[0].relevance = Relevance::substring();
        let before = response.departments.clone();

        let pool = vec![
            department("CHEM", "Chemistry", 1200),
            department("CHBE", "Chemistry Biology", 300),
        ];
        let added = reranker().inject("chemistry", Category::Department, pool, &mut response);

        assert_eq!(added, 1);
        assert_eq!(&response.departments[..1], &before[..]);
        assert_eq!(response.departments[1].dept_abbr, "CHBE");
    }

    #[test]
    fn test_inject_respects_cap() {
        let config = SearchConfig { per_category_cap: 2, ..SearchConfig::default() };
        let reranker = FuzzyReranker::new(&config);
        let mut response = SearchResponse::default();
        response.push(department("PHYS", "Physics", 10));

        let pool = vec![
            department("CHEM", "Chemistry", 10),
            department("CHM", "Chemistry", 20),
        ];
        assert_eq!(reranker.inject("chemistry", Category::Department, pool, &mut response), 1);
        assert_eq!(response.departments.len(), 2);
        // Equal similarity, larger population first
        assert_eq!(response.departments[1].dept_abbr, "CHM");
    }

    #[test]
    fn test_should_rerank_threshold() {
        let reranker = reranker();
        let mut response = SearchResponse::default();
        assert!(reranker.should_rerank(&response));
        for abbr in ["A", "B", "C"] {
            response.push(department(abbr, abbr, 1));
        }
        assert!(!reranker.should_rerank(&response));
    }
}
