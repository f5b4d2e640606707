//! HTTP routes and error mapping.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::AppState;
use crate::config::api;
use crate::error::{ExportError, LlmError, SearchError, SourceError};
use crate::export::to_csv_string;
use crate::models::{PaperRecord, SourceKind};
use crate::search::{CitationDirection, SearchRequest, SearchResponse};

/// Query parameters for the paper detail endpoint.
#[derive(Debug, Deserialize)]
pub struct PaperQuery {
    source: String,
}

/// Query parameters for the citation graph endpoints.
#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    source: String,
    #[serde(default = "default_graph_limit")]
    limit: usize,
}

const fn default_graph_limit() -> usize {
    api::DEFAULT_CITATION_LIMIT
}

/// Body of the paper analysis endpoint.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    content: String,
}

/// Body of the CSV export endpoint.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    papers: Vec<PaperRecord>,
}

/// Body of the search strategy endpoint.
#[derive(Debug, Deserialize)]
pub struct StrategyRequest {
    query: String,
}

/// Error returned by a handler, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Search(SearchError),
    Export(ExportError),
    Llm(LlmError),
    BadRequest(String),
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self::Search(err)
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        Self::Llm(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Search(SearchError::InvalidFilter { .. } | SearchError::InvalidQuery(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Search(SearchError::Source(SourceError::NotFound { .. })) => StatusCode::NOT_FOUND,
            Self::Search(SearchError::Source(_) | SearchError::SourceUnavailable { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Search(SearchError::Internal(_)) | Self::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Llm(LlmError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Llm(LlmError::EmptyInput) => StatusCode::BAD_REQUEST,
            Self::Llm(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Search(err) => err.to_user_message(),
            Self::Export(err) => err.to_string(),
            Self::Llm(err) => err.to_string(),
            Self::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/api/search", post(handle_search))
        .route("/api/paper/{*id}", get(handle_paper))
        .route("/api/citations/{*id}", get(handle_citations))
        .route("/api/references/{*id}", get(handle_references))
        .route("/api/export/csv", post(handle_export_csv))
        .route("/api/strategy", post(handle_strategy))
        .route("/api/analyze", post(handle_analyze))
        .layer(ConcurrencyLimitLayer::new(api::SERVER_CONCURRENCY))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "scholar-aggregator",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": state.search.source_kinds().collect::<Vec<_>>(),
        "journals": state.search.metrics().len(),
        "llm": state.llm.is_some(),
    }))
}

async fn handle_search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    tracing::debug!(query = %request.query, "Handling search request");
    let cancel = state.shutdown.child_token();
    let response = state.search.search(&request, None, &cancel).await?;
    Ok(Json(response))
}

async fn handle_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PaperQuery>,
) -> Result<Json<PaperRecord>, ApiError> {
    let kind = query.source.parse::<SourceKind>().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let record = state.search.fetch_detail(kind, &id).await?;
    Ok(Json(record))
}

async fn citation_graph(
    state: &AppState,
    id: &str,
    query: &GraphQuery,
    direction: CitationDirection,
) -> Result<Json<Vec<PaperRecord>>, ApiError> {
    let kind = query.source.parse::<SourceKind>().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let records = state.search.citation_graph(kind, id, direction, query.limit).await?;
    Ok(Json(records))
}

async fn handle_citations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<Vec<PaperRecord>>, ApiError> {
    citation_graph(&state, &id, &query, CitationDirection::Citations).await
}

async fn handle_references(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<Vec<PaperRecord>>, ApiError> {
    citation_graph(&state, &id, &query, CitationDirection::References).await
}

async fn handle_export_csv(Json(request): Json<ExportRequest>) -> Result<Response, ApiError> {
    let body = to_csv_string(&request.papers)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"papers.csv\""),
        ],
        body,
    )
        .into_response())
}

async fn handle_strategy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StrategyRequest>,
) -> Result<Response, ApiError> {
    let llm = state.llm.as_ref().ok_or(LlmError::NotConfigured)?;
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query is empty".to_string()));
    }
    let strategy = llm.generate_search_strategy(&request.query).await?;
    Ok(Json(strategy).into_response())
}

async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response, ApiError> {
    let llm = state.llm.as_ref().ok_or(LlmError::NotConfigured)?;
    let report = llm.analyze_paper(&request.content).await?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], report).into_response())
}
