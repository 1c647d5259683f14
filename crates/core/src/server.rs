//! HTTP surface of the gateway.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload` | Multipart upload, field `file` (PDF or plain text, at most 100MB) |
//! | `POST` | `/api/upload-text` | `{name, contents}` |
//! | `GET`  | `/api/files` | `limit`, `offset`, `order_dir` query parameters |
//! | `POST` | `/api/search` | `{query, file_ids, k}` |
//! | `POST` | `/api/ask` | `{question, context}`, relays the chat completion |
//! | `GET`  | `/health` | Liveness and version |
//!
//! Failures share one body shape:
//!
//! ```json
//! { "error": "at least one file must be selected", "code": "invalid_input" }
//! ```
//!
//! Upstream failures add an optional `details` string carrying the upstream payload.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::FILE_TOO_LARGE_MESSAGE;
use crate::gateway::Gateway;
use crate::models::{
    AskRequest, ChatCompletion, FileListing, ListFilesRequest, OrderDirection, SearchRequest,
    SearchResponse, UploadReceipt, UploadTextRequest, DEFAULT_PAGE_LIMIT,
};
use crate::traits::{DocumentStore, LanguageModel};
use crate::{ErrorKind, GatewayError};

// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// JSON failure body returned by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        ApiError(error)
    }
}

/// Client mistakes are 400, everything else 500; `code` carries the kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::UnsupportedType => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamTimeout
        | ErrorKind::UpstreamError
        | ErrorKind::GenerationFailed
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = ErrorBody {
            error: self.0.to_string(),
            code: kind.code().to_string(),
            details: self.0.detail().map(str::to_string),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError(GatewayError::invalid_input(format!(
        "invalid request body: {}",
        rejection.body_text()
    )))
}

struct AppState<S, M>
where
    S: DocumentStore,
    M: LanguageModel,
{
    gateway: Arc<Gateway<S, M>>,
}

impl<S, M> Clone for AppState<S, M>
where
    S: DocumentStore,
    M: LanguageModel,
{
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

/// Builds the router; exposed separately from [`serve`] so tests can bind
/// it to an ephemeral port.
pub fn router<S, M>(
    gateway: Arc<Gateway<S, M>>,
    config: &ServerConfig,
) -> Result<Router, GatewayError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let origin = HeaderValue::from_str(&config.frontend_url).map_err(|error| {
        GatewayError::internal(format!("invalid frontend url {:?}: {error}", config.frontend_url))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = usize::try_from(gateway.config().max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route(
            "/upload",
            post(handle_upload::<S, M>).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/upload-text", post(handle_upload_text::<S, M>))
        .route("/files", get(handle_list_files::<S, M>))
        .route("/search", post(handle_search::<S, M>))
        .route("/ask", post(handle_ask::<S, M>));

    Ok(Router::new()
        .route("/health", get(handle_health))
        .nest("/api", api)
        .with_state(AppState { gateway })
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

/// Binds `0.0.0.0:{port}` and serves until `shutdown` resolves.
pub async fn serve<S, M, F>(
    gateway: Arc<Gateway<S, M>>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), GatewayError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(gateway, config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|error| GatewayError::internal(format!("failed to bind {addr}: {error}")))?;

    info!(%addr, frontend = %config.frontend_url, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| GatewayError::internal(format!("server error: {error}")))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/upload ============

fn multipart_error(error: MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError(GatewayError::invalid_input(FILE_TOO_LARGE_MESSAGE))
    } else {
        ApiError(GatewayError::invalid_input(format!(
            "malformed upload: {}",
            error.body_text()
        )))
    }
}

/// Streams the `file` field into a staging file, then forwards it. The
/// staging file is gone by the time a response is produced.
async fn handle_upload<S, M>(
    State(state): State<AppState<S, M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReceipt>, ApiError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let mut multipart = multipart.map_err(|rejection| {
        ApiError(GatewayError::invalid_input(format!(
            "expected a multipart upload: {}",
            rejection.body_text()
        )))
    })?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let mut staged = state
            .gateway
            .stage_upload(field.file_name(), field.content_type())?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            staged.append(&chunk).await?;
        }

        let receipt = state.gateway.upload_file(staged).await?;
        return Ok(Json(receipt));
    }

    Err(GatewayError::invalid_input("No file uploaded").into())
}

// ============ POST /api/upload-text ============

async fn handle_upload_text<S, M>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<UploadTextRequest>, JsonRejection>,
) -> Result<Json<UploadReceipt>, ApiError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let Json(request) = payload.map_err(json_rejection)?;
    Ok(Json(state.gateway.upload_text(&request).await?))
}

// ============ GET /api/files ============

#[derive(Debug, Deserialize)]
struct ListFilesParams {
    offset: Option<usize>,
    limit: Option<usize>,
    order_dir: Option<String>,
}

async fn handle_list_files<S, M>(
    State(state): State<AppState<S, M>>,
    params: Result<Query<ListFilesParams>, QueryRejection>,
) -> Result<Json<FileListing>, ApiError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let Query(params) = params.map_err(|rejection| {
        ApiError(GatewayError::invalid_input(format!(
            "invalid query parameters: {}",
            rejection.body_text()
        )))
    })?;

    let order_dir = match params.order_dir.as_deref() {
        Some(raw) => raw.parse::<OrderDirection>()?,
        None => OrderDirection::default(),
    };
    let request = ListFilesRequest {
        offset: params.offset.unwrap_or(0),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        order_dir,
    };

    let results = state.gateway.list_files(&request).await?;
    Ok(Json(FileListing { results }))
}

// ============ POST /api/search ============

async fn handle_search<S, M>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let Json(request) = payload.map_err(json_rejection)?;
    let documents = state.gateway.search(&request).await?;
    Ok(Json(SearchResponse { documents }))
}

// ============ POST /api/ask ============

async fn handle_ask<S, M>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<ChatCompletion>, ApiError>
where
    S: DocumentStore + Send + Sync + 'static,
    M: LanguageModel + Send + Sync + 'static,
{
    let Json(request) = payload.map_err(json_rejection)?;
    Ok(Json(state.gateway.complete(&request).await?))
}
