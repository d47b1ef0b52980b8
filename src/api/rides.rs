use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{parse_tier, AppState};
use crate::domain::{Location, PassengerId, Ride, RideId};
use crate::error::AppError;
use crate::orchestration::NewRide;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    pub passenger_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub tier: Option<String>,
    pub payment_id: Option<String>,
}

pub async fn create_ride(
    State(state): State<AppState>,
    Json(body): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let passenger_id = body.passenger_id.trim();
    if passenger_id.is_empty() {
        return Err(AppError::BadRequest("passengerId is required".to_string()));
    }
    let tier = parse_tier(body.tier.as_deref())?;

    let ride = state
        .rides
        .request_ride(NewRide {
            passenger_id: PassengerId::new(passenger_id),
            pickup: body.pickup,
            dropoff: body.dropoff,
            tier,
            payment_id: body.payment_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

pub async fn get_ride(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.get_ride(&RideId::new(id)).await?))
}

pub async fn cancel_ride(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.cancel_ride(&RideId::new(id)).await?))
}

pub async fn start_ride(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.start_ride(&RideId::new(id)).await?))
}

pub async fn complete_ride(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.complete_ride(&RideId::new(id)).await?))
}
