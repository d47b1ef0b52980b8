//! Fare calculation per ride tier.
//!
//! `fare = (base + km * per_km + min * per_min) * demand`, floored at the tier minimum and
//! rounded to cents half-up.

use crate::domain::{Decimal, RideTier};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FareError {
    #[error("invalid fare input {name}: {value}")]
    InvalidInput { name: &'static str, value: f64 },
    #[error("fare exceeds the representable range")]
    Overflow,
}

/// Rates for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FareSchedule {
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_min_rate: Decimal,
    pub minimum_fare: Decimal,
}

impl FareSchedule {
    pub fn standard() -> Self {
        FareSchedule {
            base_fare: Decimal::from_cents(250),
            per_km_rate: Decimal::from_cents(120),
            per_min_rate: Decimal::from_cents(30),
            minimum_fare: Decimal::from_cents(500),
        }
    }

    pub fn premium() -> Self {
        FareSchedule {
            base_fare: Decimal::from_cents(500),
            per_km_rate: Decimal::from_cents(200),
            per_min_rate: Decimal::from_cents(50),
            minimum_fare: Decimal::from_cents(1000),
        }
    }

    /// Price a trip.
    ///
    /// # Errors
    /// Returns `FareError::InvalidInput` for negative or non-finite distance/duration and for a
    /// demand multiplier that is not strictly positive, and `FareError::Overflow` when the
    /// inputs are finite but the fare does not fit in a decimal.
    pub fn calculate_fare(
        &self,
        distance_km: f64,
        duration_min: f64,
        demand_multiplier: f64,
    ) -> Result<Decimal, FareError> {
        let distance = non_negative("distanceKm", distance_km)?;
        let duration = non_negative("durationMin", duration_min)?;
        if !(demand_multiplier.is_finite() && demand_multiplier > 0.0) {
            return Err(FareError::InvalidInput {
                name: "demandMultiplier",
                value: demand_multiplier,
            });
        }
        let demand = to_decimal("demandMultiplier", demand_multiplier)?;

        let raw = distance
            .checked_mul(self.per_km_rate)
            .zip(duration.checked_mul(self.per_min_rate))
            .and_then(|(by_distance, by_time)| {
                self.base_fare.checked_add(by_distance)?.checked_add(by_time)
            })
            .and_then(|subtotal| subtotal.checked_mul(demand))
            .ok_or(FareError::Overflow)?;
        Ok(raw.max(self.minimum_fare).round_money())
    }
}

impl RideTier {
    pub fn schedule(&self) -> FareSchedule {
        match self {
            RideTier::Standard => FareSchedule::standard(),
            RideTier::Premium => FareSchedule::premium(),
        }
    }

    /// Shorthand for `self.schedule().calculate_fare(..)`.
    pub fn calculate_fare(
        &self,
        distance_km: f64,
        duration_min: f64,
        demand_multiplier: f64,
    ) -> Result<Decimal, FareError> {
        self.schedule()
            .calculate_fare(distance_km, duration_min, demand_multiplier)
    }
}

/// Trip duration in minutes at a constant average speed.
pub fn estimate_duration_min(distance_km: f64, avg_speed_kmh: f64) -> f64 {
    if distance_km <= 0.0 || avg_speed_kmh <= 0.0 {
        return 0.0;
    }
    distance_km / avg_speed_kmh * 60.0
}

/// Surge multiplier from open requests vs. available drivers, clamped to `[1, cap]`.
pub fn demand_multiplier(open_requests: usize, available_drivers: usize, cap: f64) -> f64 {
    let cap = cap.max(1.0);
    if open_requests == 0 {
        return 1.0;
    }
    if available_drivers == 0 {
        return cap;
    }
    (open_requests as f64 / available_drivers as f64).clamp(1.0, cap)
}

fn non_negative(name: &'static str, value: f64) -> Result<Decimal, FareError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(FareError::InvalidInput { name, value });
    }
    to_decimal(name, value)
}

fn to_decimal(name: &'static str, value: f64) -> Result<Decimal, FareError> {
    Decimal::from_f64(value).ok_or(FareError::InvalidInput { name, value })
}
