//! HTTP surface over the transcript processor.

pub mod metrics;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::pipeline::processor::TranscriptProcessor;
use crate::pipeline::types::RunOptions;
use crate::safety::SecurityScenario;
use crate::transcript;

pub use metrics::{MetricsSnapshot, ServiceMetrics};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TranscriptProcessor>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(processor: Arc<TranscriptProcessor>) -> Self {
        Self {
            processor,
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }
}

/// Build the router. `max_upload_bytes` caps request bodies.
pub fn api_routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/transcripts", post(process_transcript))
        .route("/api/classify", post(classify_message))
        .route("/api/security-test", post(security_test))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    state.metrics.record(
        started.elapsed(),
        status.is_client_error() || status.is_server_error(),
    );
    response
}

// ── Health & metrics ────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let classifier = match state.processor.classifier_health().await {
        Ok(health) => health.status,
        Err(e) => {
            warn!(error = %e, "Classifier health check failed");
            "unreachable".to_string()
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "service": "roomscout",
        "version": env!("CARGO_PKG_VERSION"),
        "classifier": classifier,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

// ── Processing ──────────────────────────────────────────────────────────

/// POST /api/transcripts?include_results=true
///
/// Body is the raw transcript text. Invalid UTF-8 is replaced, not rejected.
async fn process_transcript(
    State(state): State<AppState>,
    Query(options): Query<RunOptions>,
    body: Bytes,
) -> impl IntoResponse {
    let text = String::from_utf8_lossy(&body);
    let report = state.processor.process(&text, options).await;
    Json(report)
}

#[derive(Deserialize)]
struct ClassifyRequest {
    #[serde(default)]
    message: String,
}

/// POST /api/classify
///
/// Accepts a bare message or a full transcript line; a line's header is
/// stripped before classification.
async fn classify_message(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> impl IntoResponse {
    let text = body.message.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Message is required"})),
        );
    }

    let parsed = transcript::parse(text).into_iter().next();
    let content = parsed.as_ref().map_or(text, |m| m.content.as_str());
    let outcome = state.processor.classify_one(content).await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "parsed": parsed,
            "result": outcome,
        })),
    )
}

#[derive(Deserialize)]
struct SecurityTestRequest {
    #[serde(default)]
    scenarios: Vec<SecurityScenario>,
}

/// POST /api/security-test
async fn security_test(
    State(state): State<AppState>,
    Json(body): Json<SecurityTestRequest>,
) -> impl IntoResponse {
    if body.scenarios.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "At least one scenario is required"})),
        );
    }

    let report = state.processor.safety().run_scenarios(&body.scenarios);
    info!(
        total = report.metrics.total_attacks,
        blocked = report.metrics.blocked_attacks,
        "Security self-test complete"
    );
    (StatusCode::OK, Json(serde_json::json!(report)))
}
