//! HTTP surface: `GET /v1/search` and `GET /healthz`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PER_PAGE, MAX_PAGE};
use crate::error::SearchError;
use crate::item::parse_kinds;
use crate::search::{SearchOptions, SearchOrchestrator, SearchResponse};
use crate::store::SearchFilters;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Builds the router around a shared orchestrator.
pub fn router(orchestrator: Arc<SearchOrchestrator>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/search", get(search_handler))
        .with_state(orchestrator)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search_handler(
    State(orchestrator): State<Arc<SearchOrchestrator>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let (query, options) = params.into_request()?;
    let response = orchestrator.search(&query, &options).await?;
    Ok(Json(response))
}

/// Raw query-string parameters; everything is validated by [`SearchParams::into_request`].
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    post_type: Option<String>,
    tags: Option<String>,
    status: Option<String>,
    author: Option<String>,
    author_type: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    sort: Option<String>,
    page: Option<String>,
    per_page: Option<String>,
    content_types: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_field<T, E>(field: &str, value: Option<String>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr<Err = E>,
    E: std::fmt::Display,
{
    non_empty(value)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| ApiError::validation(format!("invalid {field}: {err}")))
        })
        .transpose()
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    non_empty(value)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|_| ApiError::validation(format!("{field} must be YYYY-MM-DD")))
        })
        .transpose()
}

impl SearchParams {
    /// Validates parameters into a query and options.
    pub fn into_request(self) -> Result<(String, SearchOptions), ApiError> {
        let query = non_empty(self.q)
            .ok_or_else(|| ApiError::validation("query parameter 'q' is required"))?;
        let filters = SearchFilters {
            post_type: parse_field("type", self.post_type)?,
            tags: non_empty(self.tags)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            status: non_empty(self.status),
            author_id: non_empty(self.author),
            author_type: parse_field("author_type", self.author_type)?,
            from_date: parse_date("from_date", self.from_date)?,
            to_date: parse_date("to_date", self.to_date)?,
        };
        if let (Some(from), Some(to)) = (filters.from_date, filters.to_date) {
            if from > to {
                return Err(ApiError::validation("from_date must not be after to_date"));
            }
        }
        let page: usize = parse_field::<i64, _>("page", self.page)?
            .map_or(1, |page| usize::try_from(page.max(1)).unwrap_or(usize::MAX));
        if page > MAX_PAGE {
            return Err(ApiError::validation(format!("page must be at most {MAX_PAGE}")));
        }
        let per_page: usize = parse_field::<i64, _>("per_page", self.per_page)?
            .map_or(DEFAULT_PER_PAGE, |n| usize::try_from(n.max(0)).unwrap_or(usize::MAX));
        let content_types = match non_empty(self.content_types) {
            Some(raw) => parse_kinds(&raw).map_err(ApiError::validation)?,
            None => Vec::new(),
        };
        let options = SearchOptions {
            filters,
            content_types,
            sort: parse_field("sort", self.sort)?.unwrap_or_default(),
            page,
            per_page,
        };
        Ok((query, options))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Error rendered as `{ "error": { "code", "message" } }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "SEARCH_UNAVAILABLE",
            message: "search temporarily unavailable".to_string(),
        }
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(message) => Self::validation(message),
            SearchError::Lexical(_) => Self::unavailable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
