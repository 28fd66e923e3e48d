//! Grade Search Interface Definition
//!
//! Public records returned by the search pipeline, the error taxonomy, and the
//! traits at the pipeline's seams (retrieval tiers, fuzzy candidate pool, store API).
//! Acts as the source of truth for shared types.

use crate::classifier::SearchQuery;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Entity category a search row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Course,
    Professor,
    Department,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Course, Category::Professor, Category::Department];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Course => "courses",
            Category::Professor => "professors",
            Category::Department => "departments",
        }
    }
}

/// Retrieval path that produced a row.
///
/// Variants are declared weakest first so the derived `Ord` is the precedence:
/// `Indexed > Substring > Fuzzy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Fuzzy,
    Substring,
    Indexed,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalized relevance: `(source, score)`, score higher-is-better within a source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
    #[serde(rename = "match_source")]
    pub source: MatchSource,
    #[serde(rename = "relevance")]
    pub score: f64,
}

impl Relevance {
    /// FTS5 `bm25()` is lower-is-better, so it is negated.
    pub fn indexed(bm25: f64) -> Self {
        Self { source: MatchSource::Indexed, score: -bm25 }
    }

    pub fn substring() -> Self {
        Self { source: MatchSource::Substring, score: 0.0 }
    }

    pub fn fuzzy(similarity: f64) -> Self {
        Self { source: MatchSource::Fuzzy, score: similarity.clamp(0.0, 1.0) }
    }

    /// `Greater` means `self` is the better match.
    pub fn cmp_quality(&self, other: &Relevance) -> Ordering {
        self.source
            .cmp(&other.source)
            .then_with(|| self.score.total_cmp(&other.score))
    }
}

/// Precomputed grade tags joined from the summary tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    pub average_gpa: f64,
    pub most_grade: String,
    pub most_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseResult {
    pub id: i64,
    pub dept_abbr: String,
    pub course_num: String,
    pub class_desc: String,
    pub total_students: i64,
    #[serde(flatten)]
    pub summary: Option<GradeSummary>,
    #[serde(flatten)]
    pub relevance: Relevance,
}

impl CourseResult {
    /// Display code, e.g. `CS 1301`
    pub fn code(&self) -> String {
        format!("{} {}", self.dept_abbr, self.course_num).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessorResult {
    pub id: i64,
    pub name: String,
    pub total_students: i64,
    pub rmp_score: Option<f64>,
    #[serde(flatten)]
    pub summary: Option<GradeSummary>,
    #[serde(flatten)]
    pub relevance: Relevance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentResult {
    pub dept_abbr: String,
    pub dept_name: String,
    pub total_students: i64,
    #[serde(flatten)]
    pub summary: Option<GradeSummary>,
    #[serde(flatten)]
    pub relevance: Relevance,
}

/// Identity of a row, used for deduplication across tiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Course(i64),
    Professor(i64),
    Department(String),
}

/// One typed search row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    Course(CourseResult),
    Professor(ProfessorResult),
    Department(DepartmentResult),
}

impl SearchResult {
    pub fn category(&self) -> Category {
        match self {
            SearchResult::Course(_) => Category::Course,
            SearchResult::Professor(_) => Category::Professor,
            SearchResult::Department(_) => Category::Department,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            SearchResult::Course(c) => EntityKey::Course(c.id),
            SearchResult::Professor(p) => EntityKey::Professor(p.id),
            SearchResult::Department(d) => EntityKey::Department(d.dept_abbr.clone()),
        }
    }

    pub fn relevance(&self) -> Relevance {
        match self {
            SearchResult::Course(c) => c.relevance,
            SearchResult::Professor(p) => p.relevance,
            SearchResult::Department(d) => d.relevance,
        }
    }

    pub fn set_relevance(&mut self, relevance: Relevance) {
        match self {
            SearchResult::Course(c) => c.relevance = relevance,
            SearchResult::Professor(p) => p.relevance = relevance,
            SearchResult::Department(d) => d.relevance = relevance,
        }
    }

    /// Population count used as the secondary sort key
    pub fn population(&self) -> i64 {
        match self {
            SearchResult::Course(c) => c.total_students,
            SearchResult::Professor(p) => p.total_students,
            SearchResult::Department(d) => d.total_students,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            SearchResult::Course(c) => format!("{} {}", c.code(), c.class_desc),
            SearchResult::Professor(p) => p.name.clone(),
            SearchResult::Department(d) => format!("{} {}", d.dept_abbr, d.dept_name),
        }
    }

    /// Texts the fuzzy reranker scores a query against
    pub fn match_texts(&self) -> Vec<String> {
        match self {
            SearchResult::Course(c) => vec![c.code(), c.class_desc.clone()],
            SearchResult::Professor(p) => vec![p.name.clone()],
            SearchResult::Department(d) => vec![d.dept_abbr.clone(), d.dept_name.clone()],
        }
    }
}

/// Merged response, grouped by category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub courses: Vec<CourseResult>,
    pub professors: Vec<ProfessorResult>,
    pub departments: Vec<DepartmentResult>,
}

impl SearchResponse {
    /// Append a row to its category group
    pub fn push(&mut self, result: SearchResult) {
        match result {
            SearchResult::Course(c) => self.courses.push(c),
            SearchResult::Professor(p) => self.professors.push(p),
            SearchResult::Department(d) => self.departments.push(d),
        }
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = SearchResult>) {
        for result in results {
            self.push(result);
        }
    }

    pub fn len_of(&self, category: Category) -> usize {
        match category {
            Category::Course => self.courses.len(),
            Category::Professor => self.professors.len(),
            Category::Department => self.departments.len(),
        }
    }

    pub fn total(&self) -> usize {
        self.courses.len() + self.professors.len() + self.departments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Rows of one category, as typed results, in response order
    pub fn results(&self, category: Category) -> Vec<SearchResult> {
        match category {
            Category::Course => self.courses.iter().cloned().map(SearchResult::Course).collect(),
            Category::Professor => self.professors.iter().cloned().map(SearchResult::Professor).collect(),
            Category::Department => self.departments.iter().cloned().map(SearchResult::Department).collect(),
        }
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        match key {
            EntityKey::Course(id) => self.courses.iter().any(|c| c.id == *id),
            EntityKey::Professor(id) => self.professors.iter().any(|p| p.id == *id),
            EntityKey::Department(abbr) => self.departments.iter().any(|d| &d.dept_abbr == abbr),
        }
    }
}

/// Result of a search call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub response: Arc<SearchResponse>,
    /// Served from the search cache without touching storage
    pub from_cache: bool,
    /// At least one retrieval step failed; the response was not cached
    pub degraded: bool,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self {
            response: Arc::new(SearchResponse::default()),
            from_cache: false,
            degraded: false,
        }
    }
}

/// Result of an autocomplete call: a search outcome plus its HTTP cache lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct AutocompleteOutcome {
    pub outcome: SearchOutcome,
    pub max_age_secs: u64,
}

impl AutocompleteOutcome {
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age_secs)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure of a single retrieval step. Never fails a request on its own.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search index unavailable: {0}")]
    IndexMissing(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Query interrupted")]
    Interrupted,
    #[error("Query timed out after {0:?}")]
    TimedOut(Duration),
}

impl RetrievalError {
    /// A retry could succeed. A missing index is a steady state: the fallback
    /// tier's answer is complete and may be cached.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RetrievalError::IndexMissing(_))
    }
}

#[derive(Debug, Error)]
pub enum GradeSearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Search data source unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl GradeSearchError {
    /// HTTP status a handler should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            GradeSearchError::InvalidInput(_) => 400,
            GradeSearchError::Unavailable(_) | GradeSearchError::DatabaseError(_) => 500,
            GradeSearchError::Cancelled => 499,
        }
    }
}

impl From<crate::database::DatabaseError> for GradeSearchError {
    fn from(e: crate::database::DatabaseError) -> Self {
        GradeSearchError::DatabaseError(e.to_string())
    }
}

impl From<crate::database::DatabaseError> for RetrievalError {
    fn from(e: crate::database::DatabaseError) -> Self {
        match e {
            crate::database::DatabaseError::Interrupted => RetrievalError::Interrupted,
            crate::database::DatabaseError::MissingTable(table) => RetrievalError::IndexMissing(table),
            other => RetrievalError::Query(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

/// One retrieval path (indexed, substring). Runs on a blocking thread.
pub trait RetrievalTier: Send + Sync {
    fn source(&self) -> MatchSource;

    /// Rows for one category, at most `limit`, already ordered best first.
    fn retrieve(
        &self,
        query: &SearchQuery,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Vec<SearchResult>, RetrievalError>;
}

/// Broad candidate pool for the fuzzy reranker
pub trait CandidateSource: Send + Sync {
    /// Top `limit` entities of a category by population.
    fn candidate_pool(
        &self,
        category: Category,
        limit: usize,
        token: &CancellationToken,
        runtime: &tokio::runtime::Handle,
    ) -> Result<Vec<SearchResult>, RetrievalError>;
}

/// The primary interface consumed by the HTTP handler layer.
#[async_trait::async_trait]
pub trait GradeSearchApi: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────────

    /// Search all target categories. Empty or short input yields empty groups.
    async fn search(&self, query: String) -> Result<SearchOutcome, GradeSearchError>;

    /// Same contract as `search`, plus the cache lifetime for the response.
    async fn autocomplete(&self, query: String) -> Result<AutocompleteOutcome, GradeSearchError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Detail page cache
    // ─────────────────────────────────────────────────────────────────────────────

    fn get_cached_detail(&self, path: &str) -> Option<serde_json::Value>;

    fn set_cached_detail(&self, path: String, value: serde_json::Value);

    fn has_cached_detail(&self, path: &str) -> bool;
}
