//! HTTP surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ragwatch_core::{ChunkConfig, ChunkId, Error, IndexStats};
use ragwatch_index::IngestPipeline;
use ragwatch_query::RetrievalCoordinator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Label recorded as the source path of manually added text.
const MANUAL_SOURCE: &str = "<add_document>";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub coordinator: Arc<RetrievalCoordinator>,
    pub default_k: usize,
    /// Window used when `/add_document` omits one
    pub manual_window: ChunkConfig,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(alias = "query")]
    query_text: String,
    /// Signed so that `k <= 0` is rejected rather than failing to parse
    k: Option<i64>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    query_text: String,
    answer: String,
    retrieved_ids: Vec<ChunkId>,
}

#[derive(Debug, Deserialize)]
struct AddDocumentRequest {
    document: String,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AddDocumentResponse {
    chunks_indexed: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error mapped onto a status code and `{"error": ...}` body.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::EmptyQuery | Error::InvalidArgument(_) | Error::Chunking(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/query", post(query))
        .route("/add_document", post(add_document))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn status(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.pipeline.stats().await)
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let k = match request.k {
        None => state.default_k,
        Some(k) if k <= 0 => {
            return Err(Error::InvalidArgument(format!("k must be positive, got {k}")).into())
        }
        Some(k) => usize::try_from(k)
            .map_err(|_| Error::InvalidArgument(format!("k out of range: {k}")))?,
    };

    let answer = state.coordinator.answer(&request.query_text, k).await?;
    Ok(Json(QueryResponse {
        query_text: answer.query_text,
        answer: answer.answer,
        retrieved_ids: answer.retrieved_ids,
    }))
}

async fn add_document(
    State(state): State<AppState>,
    Json(request): Json<AddDocumentRequest>,
) -> Result<Json<AddDocumentResponse>, ApiError> {
    let window = ChunkConfig::new(
        request.chunk_size.unwrap_or(state.manual_window.chunk_size),
        request.overlap.unwrap_or(state.manual_window.chunk_overlap),
    )
    .map_err(Error::from)?;

    let chunks_indexed = state
        .pipeline
        .ingest_text(&request.document, MANUAL_SOURCE, Some(window))
        .await?;
    Ok(Json(AddDocumentResponse { chunks_indexed }))
}
