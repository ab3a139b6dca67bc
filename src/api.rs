//! REST API server for the brief router
//!
//! Exposes the orchestrator to the chat UI over HTTP. Query endpoints always
//! answer with a `BriefResponse` body; the status code follows its outcome.

use axum::{
    extract::{rejection::JsonRejection, Path, Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::FailureKind;
use crate::Result;
use crate::models::{BriefResponse, BriefStatus, Modality, Query};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct QueryRequest {
    #[serde(default, alias = "query")]
    pub text: String,
    #[serde(default)]
    pub query_type: Option<String>,
    /// Also synthesize speech for the answer.
    #[serde(default)]
    pub voice: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct VoiceQueryRequest {
    /// Base64-encoded audio.
    #[serde(default, alias = "audio_data")]
    pub audio: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecentParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatusParams {
    #[serde(default)]
    pub probe: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// HTTP status for a finished query.
pub fn status_for(response: &BriefResponse) -> StatusCode {
    match (response.status, response.failure) {
        (BriefStatus::Ok | BriefStatus::NeedsClarification, _) => StatusCode::OK,
        (BriefStatus::Error, Some(FailureKind::Classification)) => StatusCode::BAD_REQUEST,
        (BriefStatus::Error, Some(FailureKind::DeadlineExceeded)) => StatusCode::GATEWAY_TIMEOUT,
        (BriefStatus::Error, _) => StatusCode::BAD_GATEWAY,
    }
}

/// =============================
/// Health Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let overall = state.orchestrator.health().overall().await;
    Json(serde_json::json!({
        "status": overall.status,
        "detail": overall.detail,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn agents_status(
    State(state): State<ApiState>,
    QueryParams(params): QueryParams<StatusParams>,
) -> Json<serde_json::Value> {
    let orchestrator = &state.orchestrator;
    if params.probe {
        orchestrator.health().probe_all(orchestrator.registry()).await;
    }

    Json(serde_json::json!({
        "agents": orchestrator.health().snapshot().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoints
/// =============================

/// Error body for a request the router could not even read.
fn rejected(rejection: JsonRejection) -> (StatusCode, Json<BriefResponse>) {
    let reason = rejection.body_text();
    warn!(status = %rejection.status(), %reason, "Rejected request body");

    let response = BriefResponse {
        query_id: Uuid::new_v4(),
        status: BriefStatus::Error,
        text: format!("Unable to answer this query: {}", reason),
        audio: None,
        sources: Vec::new(),
        intent: None,
        confidence: None,
        transcription: None,
        reason: Some(reason),
        failure: Some(FailureKind::Classification),
        warnings: Vec::new(),
        reasoning_trace: Vec::new(),
        completed_at: chrono::Utc::now(),
    };
    (status_for(&response), Json(response))
}

async fn handle_query(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> (StatusCode, Json<BriefResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected(rejection),
    };
    let modality = if req.voice {
        Modality::Voice
    } else {
        Modality::Text
    };
    let query = Query::new(req.text, modality, req.query_type);
    info!(query_id = %query.id, "Received query");

    let response = state.orchestrator.handle(query).await;
    (status_for(&response), Json(response))
}

async fn handle_voice_query(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<VoiceQueryRequest>, JsonRejection>,
) -> (StatusCode, Json<BriefResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected(rejection),
    };
    info!(audio_bytes = req.audio.len(), "Received voice query");

    let response = state.orchestrator.handle_voice(&req.audio).await;
    (status_for(&response), Json(response))
}

const DEFAULT_RECENT: usize = 20;
const MAX_RECENT: usize = 200;

async fn list_queries(
    State(state): State<ApiState>,
    QueryParams(params): QueryParams<RecentParams>,
) -> Json<ApiResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT).min(MAX_RECENT);
    let audit_log = state.orchestrator.audit_log();

    let mut queries = Vec::new();
    for query_id in audit_log.recent(limit).await {
        // Evicted between the two reads.
        let Some(record) = audit_log.get(query_id).await else {
            continue;
        };
        queries.push(serde_json::json!({
            "query_id": query_id,
            "text": record.query.text,
            "intent": record.intent,
            "status": record.response.status,
            "execution_time_ms": record.execution_time_ms,
            "created_at": record.created_at,
        }));
    }

    Json(ApiResponse::success(serde_json::json!({
        "total": audit_log.len().await,
        "queries": queries,
    })))
}

async fn get_query_record(
    State(state): State<ApiState>,
    Path(query_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.audit_log().get(query_id).await {
        Some(record) => (StatusCode::OK, Json(ApiResponse::success(record))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No record for query {}", query_id))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/agents/status", get(agents_status))
        .route("/query", post(handle_query))
        .route("/voice-query", post(handle_voice_query))
        .route("/queries", get(list_queries))
        .route("/queries/:id", get(get_query_record))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(orchestrator: Arc<Orchestrator>, port: u16) -> Result<()> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler there is nothing to wait for.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
