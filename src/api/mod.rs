// HTTP API routes (player init, progress, level 2 manifest validation).

use axum::{
    extract::{Json, Query, State},
    middleware,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::manifest::{self, ValidationReport};
use crate::metrics;
use crate::progress::{self, ProgressView};
use crate::store::KvStore;

pub const MIN_PLAYER_ID_LEN: usize = 3;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInitParams {
    pub player_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub player_id: String,
    pub level: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub player_id: String,
    pub level: i64,
    pub task: String,
    pub completed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateManifestRequest {
    #[serde(default)]
    pub player_id: Option<String>,
    pub yaml: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInitResponse {
    pub ok: bool,
    pub player_id: String,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(store: Arc<dyn KvStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/welcome", get(welcome))
        // Players
        .route("/api/player/init", get(player_init))
        // Progress
        .route("/api/progress", get(get_progress))
        .route("/api/progress/update", post(update_progress))
        // Level 2
        .route("/api/level/2/validate", post(validate_level2))
        .route_layer(middleware::from_fn(metrics::track_requests))
        .route("/metrics", get(metrics_text))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Static handlers ──────────────────────────────────────────────────

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the DevOps Escape Room" }))
}

async fn metrics_text() -> String {
    metrics::gather_metrics()
}

// ── Player handlers ──────────────────────────────────────────────────

async fn player_init(
    State(state): State<AppState>,
    Query(params): Query<PlayerInitParams>,
) -> Result<Json<PlayerInitResponse>, AppError> {
    if params.player_id.chars().count() < MIN_PLAYER_ID_LEN {
        return Err(AppError::invalid(format!(
            "playerId must be at least {MIN_PLAYER_ID_LEN} characters"
        )));
    }
    progress::ensure_player(state.store.as_ref(), &params.player_id).await?;
    Ok(Json(PlayerInitResponse {
        ok: true,
        player_id: params.player_id,
    }))
}

// ── Progress handlers ────────────────────────────────────────────────

async fn get_progress(
    State(state): State<AppState>,
    Query(params): Query<ProgressParams>,
) -> Result<Json<ProgressView>, AppError> {
    let view =
        progress::get_progress(state.store.as_ref(), &params.player_id, params.level).await?;
    Ok(Json(view))
}

async fn update_progress(
    State(state): State<AppState>,
    Json(req): Json<UpdateProgressRequest>,
) -> Result<Json<ProgressView>, AppError> {
    let view = progress::update_task(
        state.store.as_ref(),
        &req.player_id,
        req.level,
        &req.task,
        req.completed,
    )
    .await?;
    metrics::TASK_UPDATES_TOTAL
        .with_label_values(&[req.level.to_string().as_str()])
        .inc();
    Ok(Json(view))
}

// ── Level 2 handlers ─────────────────────────────────────────────────

async fn validate_level2(
    State(state): State<AppState>,
    Json(req): Json<ValidateManifestRequest>,
) -> Result<Json<ValidationReport>, AppError> {
    let report = manifest::evaluate(&req.yaml);

    let outcome = if report.ok {
        "pass"
    } else if report.is_parse_error() {
        "parse_error"
    } else {
        "fail"
    };
    metrics::MANIFEST_VALIDATIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();

    if let Some(player_id) = req.player_id.as_deref().filter(|id| !id.is_empty()) {
        progress::record_validation(state.store.as_ref(), player_id, &req.yaml, &report).await?;
    }
    tracing::debug!(outcome, errors = report.errors.len(), "manifest validated");
    Ok(Json(report))
}
