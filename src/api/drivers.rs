use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::domain::{Driver, DriverId, Location};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutDriverRequest {
    pub available: bool,
    pub location: Location,
    pub vehicle_id: Option<String>,
}

/// Register a driver or report its availability and position.
pub async fn put_driver(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<PutDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .rides
        .upsert_driver(
            DriverId::new(id),
            body.available,
            body.location,
            body.vehicle_id,
        )
        .await?;
    Ok(Json(driver))
}

pub async fn get_driver(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.rides.get_driver(&DriverId::new(id)).await?))
}
