use crate::engine::FareError;
use crate::orchestration::RideError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<FareError> for AppError {
    fn from(err: FareError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<RideError> for AppError {
    fn from(err: RideError) -> Self {
        match err {
            RideError::NotFound { .. } => AppError::NotFound(err.to_string()),
            RideError::InvalidTransition(_)
            | RideError::Conflict(_)
            | RideError::DriverBusy { .. } => AppError::Conflict(err.to_string()),
            RideError::InvalidLocation(_) => AppError::BadRequest(err.to_string()),
            RideError::Store(e) => e.into(),
            RideError::IntakeClosed => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            AppError::Internal(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg) => msg,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), %message, "request failed");
        }

        let body = Json(json!({
            "status": status.as_u16(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
