//! HTTP surface for the engine.
//!
//! Exposes the four engine operations to the surrounding API layer as a
//! small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/articles/{id}/process` | Trigger background analysis (fire-and-forget) |
//! | `GET`  | `/articles/{id}/similar` | Articles similar to this one |
//! | `GET`  | `/users/{id}/recommendations` | Personalized recommendations |
//! | `GET`  | `/recommendations/by-category` | Category-matched articles |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The trigger endpoint always returns `202 Accepted` immediately with the
//! record's observed status; the analysis itself runs on a detached task
//! and its outcome is only visible by polling the record status. Compute
//! and persistence failures inside that task are logged, never surfaced
//! to the caller.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no article 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `compute_error` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the engine sits
//! behind the backend API layer, which owns real access control.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::AnalysisStatus;

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    default_limit: usize,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until
/// the process is terminated. The engine handle is built once by the
/// caller and shared into every handler.
pub async fn run_server(config: &Config, engine: Arc<Engine>) -> anyhow::Result<()> {
    let state = AppState {
        engine,
        default_limit: config.recommendation.default_limit,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/articles/{id}/process", post(handle_trigger))
        .route("/articles/{id}/similar", get(handle_similar))
        .route("/users/{id}/recommendations", get(handle_for_user))
        .route("/recommendations/by-category", get(handle_by_category))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    println!("engine listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
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

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::Compute(_) => (StatusCode::INTERNAL_SERVER_ERROR, "compute_error"),
            EngineError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check used by load balancers and monitoring.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /articles/{id}/process ============

/// JSON response body for the trigger endpoint.
#[derive(Serialize)]
struct TriggerResponse {
    status: AnalysisStatus,
}

/// Handler for `POST /articles/{id}/process`.
///
/// Spawns a detached analysis task — one per trigger, no queue — and
/// immediately reports the record's status as observed before the spawn.
/// Duplicate triggers are harmless: the pipeline's status guard turns
/// them into no-ops.
async fn handle_trigger(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    let record = state
        .engine
        .store
        .get_record(article_id)
        .await
        .map_err(EngineError::persistence)?
        .ok_or_else(|| {
            EngineError::not_found(format!("no analysis record for article {}", article_id))
        })?;

    let pipeline = state.engine.pipeline.clone();
    tokio::spawn(async move {
        if let Err(err) = pipeline.process(article_id).await {
            warn!(article_id, error = %err, "background analysis run failed");
        }
    });

    // A runnable record is about to be claimed by the spawned task;
    // terminal and in-flight records report as they are.
    let status = if record.status.is_runnable() {
        AnalysisStatus::Processing
    } else {
        record.status
    };
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { status })))
}

// ============ Recommendation endpoints ============

/// Query parameters shared by the recommendation endpoints.
#[derive(Deserialize)]
struct RecommendParams {
    k: Option<usize>,
}

/// JSON response body for all recommendation endpoints.
#[derive(Serialize)]
struct RecommendResponse {
    article_ids: Vec<i64>,
}

/// Handler for `GET /articles/{id}/similar`.
async fn handle_similar(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, AppError> {
    let k = params.k.unwrap_or(state.default_limit);
    let article_ids = state.engine.recommender.recommend_similar(article_id, k).await?;
    Ok(Json(RecommendResponse { article_ids }))
}

/// Handler for `GET /users/{id}/recommendations`.
async fn handle_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, AppError> {
    let k = params.k.unwrap_or(state.default_limit);
    let article_ids = state.engine.recommender.recommend_for_user(user_id, k).await?;
    Ok(Json(RecommendResponse { article_ids }))
}

/// Query parameters for the by-category endpoint.
#[derive(Deserialize)]
struct CategoryParams {
    /// Comma-separated category list.
    categories: String,
    k: Option<usize>,
}

/// Handler for `GET /recommendations/by-category`.
async fn handle_by_category(
    State(state): State<AppState>,
    Query(params): Query<CategoryParams>,
) -> Result<Json<RecommendResponse>, AppError> {
    let categories: Vec<String> = params
        .categories
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let k = params.k.unwrap_or(state.default_limit);
    let article_ids = state
        .engine
        .recommender
        .recommend_by_category(&categories, k)
        .await?;
    Ok(Json(RecommendResponse { article_ids }))
}
