//! Health check handler.
//!
//! `GET /v1/health` pings the transcript store. Returns 200 when the store
//! answers and 503 otherwise.

use crate::models::api::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

#[tracing::instrument(skip_all, name = "cs.handlers.health")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.orchestrator.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: "healthy".to_string(),
            }),
        ),
        Err(e) => {
            // Logged here, never surfaced to the caller.
            tracing::warn!(target: "cs.handlers.health", error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    database: "unhealthy".to_string(),
                }),
            )
        }
    }
}
