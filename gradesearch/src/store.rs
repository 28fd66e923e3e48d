//! GradeStore - search pipeline and caches behind `GradeSearchApi`
//!
//! Per request: classify, then for each target category consult the retrieval
//! tiers in order, merge and rank, fuzzy-rerank when the result is sparse, and
//! cache the complete response.
//!
//! Async Cancellation Architecture:
//! Every retrieval step runs on the blocking pool under a timeout with a child of
//! the request's CancellationToken. A timed-out step cancels its child token, which
//! interrupts the in-flight SQLite statement. When the caller drops the request
//! future, a DropGuard cancels the request token and with it every step.

use crate::cache::{CacheStats, DetailCache, SearchCache};
use crate::classifier::{self, Classification, SearchQuery, MIN_QUERY_LEN};
use crate::config::SearchConfig;
use crate::database::{Database, SubstringTier};
use crate::fuzzy::FuzzyReranker;
use crate::indexer::{self, IndexedTier};
use crate::interface::{
    AutocompleteOutcome, CandidateSource, Category, GradeSearchApi, GradeSearchError,
    RetrievalError, RetrievalTier, SearchOutcome, SearchResponse, SearchResult,
};
use crate::ranking;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Global fallback Tokio runtime for when async functions are polled outside any runtime context.
/// Shared across all GradeStore instances and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// RAII guard that cancels a token when dropped.
/// Dropping the request future drops this guard, which cancels in-flight steps.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// What the tiers produced for one category
struct CategoryOutcome {
    rows: Vec<SearchResult>,
    /// At least one tier answered (possibly with no rows)
    served: bool,
    /// At least one tier failed in a way a retry could fix
    transient_failure: bool,
}

/// Thread-safe grade search store
///
/// Concurrency Model:
/// - Storage uses an r2d2 connection pool opened read-only
/// - Each request is a sequential pipeline of blocking steps on spawn_blocking threads
/// - Caches are independent LRU stores, each behind its own mutex
/// - Uses global FALLBACK_RUNTIME when called outside any runtime
pub struct GradeStore {
    tiers: Vec<Arc<dyn RetrievalTier>>,
    candidates: Arc<dyn CandidateSource>,
    search_cache: Arc<SearchCache>,
    detail_cache: Arc<DetailCache>,
    reranker: FuzzyReranker,
    config: SearchConfig,
}

impl GradeStore {
    /// Open the grade database read-only with the indexed and substring tiers.
    /// Without FTS tables only the substring tier is consulted.
    pub fn open<P: AsRef<Path>>(db_path: P, config: SearchConfig) -> Result<Self, GradeSearchError> {
        let db = Arc::new(Database::open_read_only(db_path, config.db_pool_size)?);

        let indexed = match indexer::has_search_index(&db) {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "could not inspect search index");
                true
            }
        };

        let mut tiers: Vec<Arc<dyn RetrievalTier>> = Vec::with_capacity(2);
        if indexed {
            tiers.push(Arc::new(IndexedTier::new(Arc::clone(&db))));
        } else {
            warn!("search index missing, serving substring matches only");
        }
        tiers.push(Arc::new(SubstringTier::new(Arc::clone(&db))));
        Ok(Self::from_parts(tiers, db, config))
    }

    /// Assemble a store from explicit tiers (consulted in order) and a fuzzy candidate source.
    pub fn from_parts(
        tiers: Vec<Arc<dyn RetrievalTier>>,
        candidates: Arc<dyn CandidateSource>,
        config: SearchConfig,
    ) -> Self {
        Self {
            tiers,
            candidates,
            search_cache: Arc::new(SearchCache::new(config.search_cache_capacity)),
            detail_cache: Arc::new(DetailCache::new(config.detail_cache_capacity)),
            reranker: FuzzyReranker::new(&config),
            config,
        }
    }

    /// Share caches with other stores instead of owning fresh ones
    pub fn with_caches(mut self, search_cache: Arc<SearchCache>, detail_cache: Arc<DetailCache>) -> Self {
        self.search_cache = search_cache;
        self.detail_cache = detail_cache;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn search_cache_stats(&self) -> CacheStats {
        self.search_cache.stats()
    }

    pub fn detail_cache_stats(&self) -> CacheStats {
        self.detail_cache.stats()
    }

    /// Get a tokio runtime handle - uses current runtime if available, otherwise global fallback
    fn runtime_handle(&self) -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    /// Run one blocking step under the step timeout with a child of `token`.
    async fn run_step<T, F>(&self, token: &CancellationToken, step: F) -> Result<T, RetrievalError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken, &tokio::runtime::Handle) -> Result<T, RetrievalError> + Send + 'static,
    {
        let runtime = self.runtime_handle();
        let runtime_for_closure = runtime.clone();
        let limit = self.config.step_timeout();
        let step_token = token.child_token();
        let token_clone = step_token.clone();

        // runtime.spawn_blocking() rather than tokio::task::spawn_blocking() so the
        // step also runs when the caller is not inside a tokio runtime
        let blocking = runtime.spawn_blocking(move || step(&token_clone, &runtime_for_closure));
        let timed = runtime.spawn(async move { tokio::time::timeout(limit, blocking).await });

        match timed.await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(join_error))) => Err(RetrievalError::Query(format!("retrieval step panicked: {}", join_error))),
            Ok(Err(_elapsed)) => {
                step_token.cancel();
                Err(RetrievalError::TimedOut(limit))
            }
            Err(join_error) => Err(RetrievalError::Query(format!("retrieval step aborted: {}", join_error))),
        }
    }

    /// Consult tiers in order. The first tier with rows wins, except for
    /// low-confidence queries where every tier's rows are merged.
    async fn retrieve_category(
        &self,
        query: &Arc<SearchQuery>,
        category: Category,
        token: &CancellationToken,
    ) -> CategoryOutcome {
        let limit = self.config.per_category_cap;
        let mut tier_rows = Vec::with_capacity(self.tiers.len());
        let mut served = false;
        let mut transient_failure = false;

        for tier in &self.tiers {
            if token.is_cancelled() {
                break;
            }

            let step_tier = Arc::clone(tier);
            let step_query = Arc::clone(query);
            let result = self
                .run_step(token, move |step_token, runtime| {
                    step_tier.retrieve(&step_query, category, limit, step_token, runtime)
                })
                .await;

            match result {
                Ok(rows) => {
                    debug!(
                        tier = ?tier.source(),
                        category = category.as_str(),
                        rows = rows.len(),
                        "tier answered"
                    );
                    served = true;
                    let found = !rows.is_empty();
                    tier_rows.push(rows);
                    if found && !query.is_low_confidence() {
                        break;
                    }
                }
                Err(e) if e.is_transient() => {
                    transient_failure = true;
                    warn!(tier = ?tier.source(), category = category.as_str(), error = %e, "retrieval tier failed");
                }
                Err(e) => {
                    debug!(tier = ?tier.source(), category = category.as_str(), error = %e, "retrieval tier skipped");
                }
            }
        }

        CategoryOutcome {
            rows: ranking::rank_category(ranking::merge_tier_rows(tier_rows), limit),
            served,
            transient_failure,
        }
    }

    /// Full pipeline for a classified query. Returns the response and whether a
    /// step failed transiently, in which case the response must not be cached.
    async fn execute(
        &self,
        query: SearchQuery,
        token: &CancellationToken,
    ) -> Result<(SearchResponse, bool), GradeSearchError> {
        let query = Arc::new(query);
        let mut response = SearchResponse::default();
        let mut served_any = false;
        let mut degraded = false;

        for &category in query.targets() {
            let outcome = self.retrieve_category(&query, category, token).await;
            if token.is_cancelled() {
                return Err(GradeSearchError::Cancelled);
            }
            served_any |= outcome.served;
            degraded |= outcome.transient_failure;
            response.extend(outcome.rows);
        }

        if !served_any {
            return Err(GradeSearchError::Unavailable(format!(
                "no retrieval tier could serve {:?}",
                query.normalized()
            )));
        }

        if self.reranker.should_rerank(&response) {
            for &category in query.targets() {
                let candidates = Arc::clone(&self.candidates);
                let pool_size = self.config.fuzzy_pool_size;
                let pool = self
                    .run_step(token, move |step_token, runtime| {
                        candidates.candidate_pool(category, pool_size, step_token, runtime)
                    })
                    .await;

                match pool {
                    Ok(pool) => {
                        let added = self.reranker.inject(query.normalized(), category, pool, &mut response);
                        if added > 0 {
                            debug!(category = category.as_str(), added, "fuzzy matches appended");
                        }
                    }
                    Err(e) => {
                        degraded |= e.is_transient();
                        warn!(category = category.as_str(), error = %e, "fuzzy candidate pool failed");
                    }
                }
            }
            if token.is_cancelled() {
                return Err(GradeSearchError::Cancelled);
            }
        }

        Ok((response, degraded))
    }
}

#[async_trait::async_trait]
impl GradeSearchApi for GradeStore {
    /// Search all target categories of the query.
    ///
    /// This is an async function that supports cancellation. When the caller drops
    /// the future, the DropGuard triggers the CancellationToken, interrupting the
    /// running SQLite statement.
    async fn search(&self, query: String) -> Result<SearchOutcome, GradeSearchError> {
        let search_query = match classifier::classify(&query) {
            Ok(Classification::Query(q)) => q,
            Ok(Classification::Rejected) | Err(_) => return Ok(SearchOutcome::empty()),
        };

        let key = search_query.normalized().to_string();
        if let Some(response) = self.search_cache.get(&key) {
            debug!(query = %key, "search cache hit");
            return Ok(SearchOutcome {
                response,
                from_cache: true,
                degraded: false,
            });
        }
        debug!(query = %key, category = ?search_query.category(), "search cache miss");

        let token = CancellationToken::new();
        let _guard = DropGuard::new(token.clone());

        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let (response, degraded) = self.execute(search_query, &token).await?;

        #[cfg(feature = "perf-log")]
        debug!(
            query = %key,
            total = response.total(),
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            "search pipeline"
        );

        let response = Arc::new(response);
        if degraded {
            warn!(query = %key, "serving degraded result without caching");
        } else if let Some(evicted) = self.search_cache.set(key, Arc::clone(&response)) {
            debug!(evicted = %evicted, "search cache eviction");
        }

        Ok(SearchOutcome {
            response,
            from_cache: false,
            degraded,
        })
    }

    async fn autocomplete(&self, query: String) -> Result<AutocompleteOutcome, GradeSearchError> {
        let max_age_secs = if classifier::is_department_prefix_shape(&query) {
            self.config.autocomplete_prefix_max_age_secs
        } else {
            self.config.autocomplete_max_age_secs
        };

        let outcome = if query.trim().chars().count() < MIN_QUERY_LEN {
            SearchOutcome::empty()
        } else {
            self.search(query).await?
        };

        Ok(AutocompleteOutcome { outcome, max_age_secs })
    }

    fn get_cached_detail(&self, path: &str) -> Option<serde_json::Value> {
        self.detail_cache.get(path)
    }

    fn set_cached_detail(&self, path: String, value: serde_json::Value) {
        if let Some(evicted) = self.detail_cache.set(path, value) {
            debug!(evicted = %evicted, "detail cache eviction");
        }
    }

    fn has_cached_detail(&self, path: &str) -> bool {
        self.detail_cache.has(path)
    }
}
