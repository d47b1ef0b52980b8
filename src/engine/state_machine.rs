//! Ride status transitions.
//!
//! Every mutation goes through [`transition`]. The helpers return an updated copy and never
//! touch storage; callers persist the copy with a compare-and-set on the prior status.

use crate::domain::{Decimal, Driver, Ride, RideStatus, TimeMs};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid ride transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RideStatus,
    pub to: RideStatus,
}

/// Whether `from -> to` is a legal edge.
pub fn is_allowed(from: RideStatus, to: RideStatus) -> bool {
    use RideStatus::*;
    matches!(
        (from, to),
        (Requested, Invited)
            | (Requested, Cancelled)
            | (Invited, Accepted)
            | (Invited, Denied)
            | (Accepted, InProgress)
            | (InProgress, Completed)
    )
}

/// Move `ride` to `target`, leaving the input untouched.
pub fn transition(ride: &Ride, target: RideStatus) -> Result<Ride, InvalidTransition> {
    if !is_allowed(ride.status, target) {
        return Err(InvalidTransition {
            from: ride.status,
            to: target,
        });
    }
    let mut next = ride.clone();
    next.status = target;
    Ok(next)
}

/// Assign `driver` at `fare`: REQUESTED -> INVITED -> ACCEPTED in one step.
pub fn assign(ride: &Ride, driver: &Driver, fare: Decimal) -> Result<Ride, InvalidTransition> {
    let invited = transition(ride, RideStatus::Invited)?;
    let mut accepted = transition(&invited, RideStatus::Accepted)?;
    accepted.driver_id = Some(driver.id.clone());
    accepted.vehicle_id = driver.vehicle_id.clone();
    accepted.fare_amount = Some(fare);
    Ok(accepted)
}

pub fn cancel(ride: &Ride) -> Result<Ride, InvalidTransition> {
    transition(ride, RideStatus::Cancelled)
}

pub fn start(ride: &Ride, at: TimeMs) -> Result<Ride, InvalidTransition> {
    let mut started = transition(ride, RideStatus::InProgress)?;
    started.started_at = Some(at);
    Ok(started)
}

pub fn complete(ride: &Ride, at: TimeMs) -> Result<Ride, InvalidTransition> {
    let mut completed = transition(ride, RideStatus::Completed)?;
    completed.completed_at = Some(at);
    Ok(completed)
}
