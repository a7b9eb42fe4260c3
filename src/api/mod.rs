//! HTTP API: REST surface over the stores, the orchestrator, and the
//! collaborators. Long-running operations return a task snapshot to poll.

pub mod articles;
pub mod audio;
pub mod sync;
pub mod tasks;
pub mod themes;
pub mod vocabulary;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::error::{Error, StoreError, TaskError};
use crate::jobs::JobDeps;
use crate::tasks::TaskOrchestrator;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub deps: JobDeps,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub audio_dir: PathBuf,
}

/// Build the full application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/vocabulary", get(vocabulary::list))
        .route("/api/vocabulary/stats", get(vocabulary::stats))
        .route("/api/vocabulary/search", post(vocabulary::search))
        .route(
            "/api/vocabulary/{id}",
            get(vocabulary::get_word).delete(vocabulary::delete_word),
        )
        .route("/api/articles/extract", post(articles::extract))
        .route("/api/themes", get(themes::list).post(themes::create))
        .route("/api/themes/{name}", get(themes::get_theme))
        .route("/api/audio/generate", post(audio::generate))
        .route("/api/audio/{filename}", get(audio::serve_file))
        .route("/api/sync/status", get(sync::status))
        .route("/api/sync/anki", post(sync::sync_anki))
        .route("/api/tasks/{id}", get(tasks::get_status))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "vocab-assist",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "vocab-assist"}))
}

/// Error wrapper mapping domain errors onto HTTP statuses.
pub enum ApiError {
    Domain(Error),
    Status(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Status(status, detail) => (status, detail),
            Self::Domain(err) => {
                let status = match &err {
                    Error::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
                    Error::Store(StoreError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
                    Error::Task(TaskError::NotFound { .. }) => StatusCode::NOT_FOUND,
                    Error::Task(_) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };
        if status.is_server_error() {
            tracing::error!(error = detail, "Request failed");
        }
        (status, Json(json!({"detail": detail}))).into_response()
    }
}

impl<E> From<E> for ApiError
where
    Error: From<E>,
{
    fn from(err: E) -> Self {
        Self::Domain(Error::from(err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// 404 with a FastAPI-style detail body.
pub(crate) fn not_found(detail: impl Into<String>) -> ApiError {
    ApiError::Status(StatusCode::NOT_FOUND, detail.into())
}
