//! HTTP API server exposing the orchestrator to the UI layer.
//!
//! Thin transport glue: credentials are resolved to a principal, bytes
//! and parameters are pulled out of the request, and everything else is
//! the orchestrator's job.

use crate::auth::{Authenticator, RequestContext, TokenAuthenticator};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::GranskaError;
use crate::orchestrator::Orchestrator;
use crate::task::{Task, TaskFilter};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// 50 MiB upload ceiling.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    authenticator: TokenAuthenticator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let authenticator = TokenAuthenticator::new(settings.server.auth_tokens.clone());
    let orchestrator = Orchestrator::new(settings)?;

    let state = Arc::new(AppState {
        orchestrator,
        authenticator,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/analyze/audio", post(analyze_audio))
        .route("/analyze/image", post(analyze_image))
        .route("/analyze/document", post(analyze_document))
        .route("/summarize/url", post(summarize_url))
        .route("/tasks", get(list_tasks))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Granska API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Analyze Audio", "POST /analyze/audio");
    Output::kv("Analyze Image", "POST /analyze/image");
    Output::kv("Analyze Document", "POST /analyze/document");
    Output::kv("Summarize URL", "POST /summarize/url");
    Output::kv("List Tasks", "GET  /tasks");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Error mapping ===

/// Transport-level wrapper for core errors.
struct ApiError(GranskaError);

impl From<GranskaError> for ApiError {
    fn from(err: GranskaError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GranskaError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GranskaError::InvalidInput(_)
            | GranskaError::UnsupportedFormat(_)
            | GranskaError::FetchFailed(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Resolve the bearer token to a request context. Unknown or missing
/// credentials yield an anonymous context; the orchestrator rejects it
/// before creating any task.
fn request_context(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match state.authenticator.authenticate(token) {
        Ok(principal) => RequestContext {
            principal: Some(principal),
        },
        Err(_) => RequestContext::anonymous(),
    }
}

/// Pull the first file field out of a multipart body.
async fn read_upload(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<(Vec<u8>, String, String), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError(GranskaError::InvalidInput(format!("Malformed upload: {}", e)))
    })? {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| {
            ApiError(GranskaError::InvalidInput(format!("Failed to read upload: {}", e)))
        })?;

        return Ok((bytes.to_vec(), filename, mime));
    }

    Err(ApiError(GranskaError::InvalidInput(format!(
        "No {} file provided",
        field_name
    ))))
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn analyze_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let ctx = request_context(&state, &headers);
    let (bytes, filename, _mime) = read_upload(&mut multipart, "audio").await?;

    let result = state
        .orchestrator
        .submit_conversation_analysis(bytes, &filename, &ctx)
        .await?;
    Ok(Json(result).into_response())
}

async fn analyze_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let ctx = request_context(&state, &headers);
    let (bytes, filename, mime) = read_upload(&mut multipart, "image").await?;

    let result = state
        .orchestrator
        .submit_image_analysis(bytes, &mime, &filename, &ctx)
        .await?;
    Ok(Json(result).into_response())
}

async fn analyze_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let ctx = request_context(&state, &headers);
    let (bytes, filename, mime) = read_upload(&mut multipart, "document").await?;

    let result = state
        .orchestrator
        .submit_document_summarization(bytes, &filename, &mime, &ctx)
        .await?;
    Ok(Json(result).into_response())
}

#[derive(Deserialize)]
struct UrlRequest {
    url: String,
}

async fn summarize_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UrlRequest>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&state, &headers);

    let result = state
        .orchestrator
        .submit_url_summarization(&request.url, &ctx)
        .await?;
    Ok(Json(result).into_response())
}

#[derive(Deserialize)]
struct TasksQuery {
    kind: Option<String>,
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
struct TasksResponse {
    tasks: Vec<Task>,
    total_count: usize,
    limit: usize,
    offset: usize,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TasksQuery>,
) -> Result<Response, ApiError> {
    let ctx = request_context(&state, &headers);

    let filter = TaskFilter {
        kind: query
            .kind
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(GranskaError::InvalidInput)?,
        status: query
            .status
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(GranskaError::InvalidInput)?,
    };

    let (tasks, total_count) =
        state
            .orchestrator
            .list_tasks(&ctx, &filter, query.limit, query.offset)?;

    Ok(Json(TasksResponse {
        tasks,
        total_count,
        limit: query.limit,
        offset: query.offset,
    })
    .into_response())
}
