//! HTTP API for starting analyses and querying status.
//!
//! Two status surfaces share one source of truth: the canonical
//! per-phase endpoint and the legacy flat endpoint, both derived from
//! the same store snapshot and both carrying an explicit `version` tag.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::errors::OrchestratorError;
use crate::models::{
    AnalysisConfig, JobSnapshot, LegacyStatus, StartResponse, StatusPayload,
};
use crate::orchestrator::Orchestrator;
use crate::phase::PhaseId;
use crate::store::DbHandle;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: DbHandle,
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub repository_key: String,
    #[serde(flatten)]
    pub config: AnalysisConfig,
}

#[derive(Deserialize)]
pub struct LegacyStatusQuery {
    pub repo: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidRepositoryKey { .. } => ApiError::BadRequest(err.to_string()),
            OrchestratorError::JobNotFound { .. } => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/sequential/start", post(start_analysis))
        .route("/sequential/status/{owner}/{repo}", get(canonical_status))
        .route("/sequential/jobs/{owner}/{repo}", delete(clear_repository))
        .route("/sequential/jobs/{owner}/{repo}/retry", post(retry_analysis))
        .route("/processing-status", get(legacy_status))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn start_analysis(
    State(state): State<SharedState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .start(&req.repository_key, &req.config)
        .await?;
    let current = outcome
        .job
        .current_phase
        .unwrap_or(PhaseId::Documentation);
    Ok(Json(StartResponse::new(outcome.job.id, current)))
}

/// Canonical v2 status. Querying a repository that was never started is
/// not an error; it reads as a pending job at zero progress.
async fn canonical_status(
    State(state): State<SharedState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<StatusPayload>, ApiError> {
    let key = format!("{}/{}", owner, repo);
    let snapshot = state
        .orchestrator
        .snapshot(&key)
        .await?
        .unwrap_or_else(|| JobSnapshot::not_started(&key));
    Ok(Json(StatusPayload::Canonical(snapshot)))
}

/// Legacy v1 flat status. Derived from the canonical snapshot on every
/// request; 404 until a job exists, which pollers treat as "not yet".
async fn legacy_status(
    State(state): State<SharedState>,
    Query(query): Query<LegacyStatusQuery>,
) -> Result<Json<StatusPayload>, ApiError> {
    let snapshot = state
        .orchestrator
        .snapshot(&query.repo)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No processing status for {}", query.repo)))?;

    // Detail rows come from the phase currently in flight; a finished or
    // failed job shows the last phase it touched.
    let phase = snapshot.current_phase.unwrap_or(PhaseId::Analysis);
    let detailed = match snapshot.job_id {
        Some(job_id) => state
            .store
            .call(move |db| db.file_items(job_id, phase))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        None => Vec::new(),
    };

    Ok(Json(StatusPayload::Legacy(LegacyStatus::from_snapshot(
        &snapshot, detailed,
    ))))
}

async fn clear_repository(
    State(state): State<SharedState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = format!("{}/{}", owner, repo);
    let deleted = state.orchestrator.clear(&key).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn retry_analysis(
    State(state): State<SharedState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<StartResponse>, ApiError> {
    let key = format!("{}/{}", owner, repo);
    let outcome = state.orchestrator.retry(&key).await?;
    let current = outcome
        .job
        .current_phase
        .unwrap_or(PhaseId::Documentation);
    Ok(Json(StartResponse::new(outcome.job.id, current)))
}

async fn health_check() -> &'static str {
    "ok"
}
