pub mod drivers;
pub mod health;
pub mod quotes;
pub mod rides;

use crate::domain::RideTier;
use crate::error::AppError;
use crate::orchestration::RideService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub rides: Arc<RideService>,
}

impl AppState {
    pub fn new(rides: Arc<RideService>) -> Self {
        Self { rides }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/quotes", get(quotes::get_quote))
        .route("/v1/quotes/route", post(quotes::quote_route))
        .route("/v1/rides", post(rides::create_ride))
        .route("/v1/rides/:id", get(rides::get_ride))
        .route("/v1/rides/:id/cancel", post(rides::cancel_ride))
        .route("/v1/rides/:id/start", post(rides::start_ride))
        .route("/v1/rides/:id/complete", post(rides::complete_ride))
        .route(
            "/v1/drivers/:id",
            get(drivers::get_driver).put(drivers::put_driver),
        )
        .layer(cors)
        .with_state(state)
}

/// Parse an optional tier label; blank or missing means the default tier.
fn parse_tier(input: Option<&str>) -> Result<RideTier, AppError> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(RideTier::default()),
        Some(s) => s
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Unknown tier: {s}"))),
    }
}
