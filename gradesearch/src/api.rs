//! Handler-facing search endpoints
//!
//! Maps `GradeSearchApi` outcomes onto status codes, headers and JSON bodies.
//! Parameter parsing and transport belong to the HTTP layer; these functions
//! take the already-extracted `q` parameter.

use crate::interface::{GradeSearchApi, GradeSearchError, SearchResponse};
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

impl ApiResponse {
    fn ok(response: &SearchResponse) -> Self {
        let body = serde_json::to_value(response).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize search response");
            json!({ "courses": [], "professors": [], "departments": [] })
        });
        Self { status: 200, headers: Vec::new(), body }
    }

    fn error(err: &GradeSearchError) -> Self {
        Self {
            status: err.status_code(),
            headers: Vec::new(),
            body: json!({ "error": err.to_string() }),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn missing_query() -> GradeSearchError {
    GradeSearchError::InvalidInput("missing query parameter 'q'".to_string())
}

/// `GET /search?q=...`
pub async fn search_endpoint<A>(api: &A, q: Option<&str>) -> ApiResponse
where
    A: GradeSearchApi + ?Sized,
{
    let Some(q) = q else {
        return ApiResponse::error(&missing_query());
    };

    match api.search(q.to_string()).await {
        Ok(outcome) => {
            let mut response = ApiResponse::ok(&outcome.response);
            response.headers.push((
                "X-Cache",
                if outcome.from_cache { "HIT" } else { "MISS" }.to_string(),
            ));
            response
        }
        Err(e) => {
            warn!(error = %e, "search failed");
            ApiResponse::error(&e)
        }
    }
}

/// `GET /autocomplete?q=...`
pub async fn autocomplete_endpoint<A>(api: &A, q: Option<&str>) -> ApiResponse
where
    A: GradeSearchApi + ?Sized,
{
    let Some(q) = q else {
        return ApiResponse::error(&missing_query());
    };

    match api.autocomplete(q.to_string()).await {
        Ok(autocomplete) => {
            let mut response = ApiResponse::ok(&autocomplete.outcome.response);
            response.headers.push(("Cache-Control", autocomplete.cache_control()));
            response
        }
        Err(e) => {
            warn!(error = %e, "autocomplete failed");
            ApiResponse::error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{AutocompleteOutcome, SearchOutcome};

    /// Store that answers every query with an empty result, or always fails
    struct StaticApi {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl GradeSearchApi for StaticApi {
        async fn search(&self, _query: String) -> Result<SearchOutcome, GradeSearchError> {
            if self.fail {
                Err(GradeSearchError::Unavailable("database gone".into()))
            } else {
                Ok(SearchOutcome::empty())
            }
        }

        async fn autocomplete(&self, query: String) -> Result<AutocompleteOutcome, GradeSearchError> {
            let outcome = self.search(query).await?;
            Ok(AutocompleteOutcome { outcome, max_age_secs: 300 })
        }

        fn get_cached_detail(&self, _path: &str) -> Option<serde_json::Value> {
            None
        }

        fn set_cached_detail(&self, _path: String, _value: serde_json::Value) {}

        fn has_cached_detail(&self, _path: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_missing_query_is_bad_request() {
        let api = StaticApi { fail: false };
        let response = search_endpoint(&api, None).await;
        assert_eq!(response.status, 400);
        assert!(response.body["error"].as_str().unwrap().contains("'q'"));

        let response = autocomplete_endpoint(&api, None).await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_empty_result_shape() {
        let api = StaticApi { fail: false };
        let response = search_endpoint(&api, Some("")).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            json!({ "courses": [], "professors": [], "departments": [] })
        );
        assert_eq!(response.header("x-cache"), Some("MISS"));
    }

    #[tokio::test]
    async fn test_unavailable_is_server_error() {
        let api = StaticApi { fail: true };
        let response = search_endpoint(&api, Some("calculus")).await;
        assert_eq!(response.status, 500);
        assert!(response.body["error"].is_string());

        let response = autocomplete_endpoint(&api, Some("calculus")).await;
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_autocomplete_sets_cache_control() {
        let api = StaticApi { fail: false };
        let response = autocomplete_endpoint(&api, Some("calc")).await;
        assert_eq!(response.header("Cache-Control"), Some("public, max-age=300"));
    }
}
