use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready once the store answers; reports how many rides are waiting for a driver.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.rides.open_requests().await {
        Ok(open) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "openRequests": open})),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
        }
    }
}
