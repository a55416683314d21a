//! HTTP service boundary
//!
//! Thin axum surface over the build orchestrator: one build route,
//! health, and the metrics exposition. Handlers translate the error
//! taxonomy into status codes and short machine-readable bodies; no
//! internal detail leaks to callers.

use crate::builder::errors::BuildError;
use crate::builder::orchestrator::{BuildOrchestrator, BuildRequest, BuildResult, PolicyTrace};
use crate::metrics::Metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared state for the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BuildOrchestrator>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    serialized_transaction: String,
    meta: BuildMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildMeta {
    mode: String,
    inputs_used: usize,
    total_inputs_available: usize,
    fee_in_base_unit: u64,
    truncated_by_cap: bool,
    fallback_used: bool,
    policy_trace: PolicyTrace,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    kind: &'static str,
}

impl From<BuildResult> for BuildResponse {
    fn from(result: BuildResult) -> Self {
        BuildResponse {
            serialized_transaction: result.serialized_transaction,
            meta: BuildMeta {
                mode: result.trace.selection_mode.clone(),
                inputs_used: result.inputs_used,
                total_inputs_available: result.total_inputs_available,
                fee_in_base_unit: result.fee_paid,
                truncated_by_cap: result.truncated_by_cap,
                fallback_used: result.fallback_used,
                policy_trace: result.trace,
            },
        }
    }
}

fn error_response(err: &BuildError) -> (StatusCode, Json<ErrorBody>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: ErrorDetail { message: err.to_string(), kind: err.category() },
    };
    (status, Json(body))
}

async fn handle_build(
    State(state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Response {
    match state.orchestrator.build(request).await {
        Ok(result) => Json(BuildResponse::from(result)).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/transactions/build", post(handle_build))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP surface listening on {}", addr);
    axum::serve(listener, app).await.map_err(|err| {
        error!(error = %err, "HTTP server terminated unexpectedly");
        anyhow::anyhow!(err)
    })
}
