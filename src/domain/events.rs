//! Messages exchanged between intake, the coordinator and downstream listeners.

use crate::domain::{Decimal, DriverId, RideId, TimeMs};
use serde::Serialize;

/// A ride entered REQUESTED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequested {
    pub ride_id: RideId,
    pub requested_at: TimeMs,
}

/// Outcome of the matching core for a single ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatchEvent {
    #[serde(rename_all = "camelCase")]
    RideMatched {
        ride_id: RideId,
        driver_id: DriverId,
        fare: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    RideCancelled { ride_id: RideId },
}

impl MatchEvent {
    pub fn ride_id(&self) -> &RideId {
        match self {
            MatchEvent::RideMatched { ride_id, .. } => ride_id,
            MatchEvent::RideCancelled { ride_id } => ride_id,
        }
    }
}
