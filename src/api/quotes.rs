use axum::extract::Query;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::parse_tier;
use crate::domain::{Location, RideTier};
use crate::engine::distance_km;
use crate::error::AppError;

fn default_demand() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub tier: Option<String>,
    pub distance_km: f64,
    pub duration_min: f64,
    #[serde(default = "default_demand")]
    pub demand_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub tier: RideTier,
    pub fare: String,
}

pub async fn get_quote(Query(params): Query<QuoteQuery>) -> Result<Json<QuoteResponse>, AppError> {
    let tier = parse_tier(params.tier.as_deref())?;
    let fare = tier.calculate_fare(
        params.distance_km,
        params.duration_min,
        params.demand_multiplier,
    )?;
    Ok(Json(QuoteResponse {
        tier,
        fare: fare.to_money_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuoteRequest {
    pub pickup: Location,
    pub dropoff: Location,
    pub duration_min: f64,
    #[serde(default = "default_demand")]
    pub demand_multiplier: f64,
    pub tiers: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuoteResponse {
    pub distance_km: f64,
    pub fares: BTreeMap<String, String>,
}

/// Price a pickup/dropoff pair for each requested tier, or for every tier when none are named.
pub async fn quote_route(
    Json(body): Json<RouteQuoteRequest>,
) -> Result<Json<RouteQuoteResponse>, AppError> {
    for location in [&body.pickup, &body.dropoff] {
        location
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    let tiers = match &body.tiers {
        None => RideTier::ALL.to_vec(),
        Some(names) => names
            .iter()
            .map(|name| parse_tier(Some(name)))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let distance = distance_km(&body.pickup, &body.dropoff);
    let mut fares = BTreeMap::new();
    for tier in tiers {
        let fare = tier.calculate_fare(distance, body.duration_min, body.demand_multiplier)?;
        fares.insert(tier.as_str().to_string(), fare.to_money_string());
    }

    Ok(Json(RouteQuoteResponse {
        distance_km: distance,
        fares,
    }))
}
