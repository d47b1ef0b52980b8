//! Ride record, status and tier.

use crate::domain::{Decimal, DriverId, Location, PassengerId, RideId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Ride lifecycle status. See `engine::state_machine` for the legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Invited,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Denied,
}

impl RideStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::Denied
        )
    }

    /// Statuses in which a driver and a fare must be present.
    pub fn is_assigned(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted | RideStatus::InProgress | RideStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Invited => "INVITED",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
            RideStatus::Denied => "DENIED",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for RideStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(RideStatus::Requested),
            "INVITED" => Ok(RideStatus::Invited),
            "ACCEPTED" => Ok(RideStatus::Accepted),
            "IN_PROGRESS" => Ok(RideStatus::InProgress),
            "COMPLETED" => Ok(RideStatus::Completed),
            "CANCELLED" => Ok(RideStatus::Cancelled),
            "DENIED" => Ok(RideStatus::Denied),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Ride tier selector. Each tier maps to one fare schedule.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RideTier {
    #[default]
    Standard,
    Premium,
}

impl RideTier {
    pub const ALL: [RideTier; 2] = [RideTier::Standard, RideTier::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            RideTier::Standard => "standard",
            RideTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for RideTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RideTier::Standard),
            "premium" => Ok(RideTier::Premium),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// A passenger transport request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: RideId,
    pub status: RideStatus,
    pub tier: RideTier,
    pub requested_at: TimeMs,
    pub started_at: Option<TimeMs>,
    pub completed_at: Option<TimeMs>,
    /// Set once the ride reaches ACCEPTED.
    pub fare_amount: Option<Decimal>,
    pub pickup: Location,
    pub dropoff: Location,
    pub passenger_id: PassengerId,
    /// Set once the ride reaches ACCEPTED.
    pub driver_id: Option<DriverId>,
    pub vehicle_id: Option<String>,
    pub payment_id: Option<String>,
    pub rating_ids: Vec<String>,
}

impl Ride {
    /// A fresh ride in REQUESTED with a generated id.
    pub fn requested(
        passenger_id: PassengerId,
        pickup: Location,
        dropoff: Location,
        tier: RideTier,
        requested_at: TimeMs,
    ) -> Self {
        Ride {
            id: RideId::generate(),
            status: RideStatus::Requested,
            tier,
            requested_at,
            started_at: None,
            completed_at: None,
            fare_amount: None,
            pickup,
            dropoff,
            passenger_id,
            driver_id: None,
            vehicle_id: None,
            payment_id: None,
            rating_ids: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: RideId) -> Self {
        self.id = id;
        self
    }

    pub fn with_payment(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }
}
