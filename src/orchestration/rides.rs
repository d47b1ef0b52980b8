//! Ride intake and the explicit lifecycle operations exposed over HTTP.

use crate::domain::{
    Driver, DriverId, Location, LocationError, PassengerId, Ride, RideId, RideRequested,
    RideStatus, RideTier,
};
use crate::engine::{state_machine, InvalidTransition};
use crate::orchestration::clock::Clock;
use crate::orchestration::events::EventProducer;
use crate::store::{RideStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RideError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("ride {0} was modified concurrently")]
    Conflict(RideId),
    #[error("driver {driver} is assigned to active ride {ride}")]
    DriverBusy { driver: DriverId, ride: RideId },
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] LocationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ride intake is closed")]
    IntakeClosed,
}

/// A passenger's request before it is stored.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub passenger_id: PassengerId,
    pub pickup: Location,
    pub dropoff: Location,
    pub tier: RideTier,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RideService {
    store: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    intake: EventProducer<RideRequested>,
}

impl RideService {
    pub fn new(
        store: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        intake: EventProducer<RideRequested>,
    ) -> Self {
        Self {
            store,
            clock,
            intake,
        }
    }

    /// Store a new REQUESTED ride and hand it to the matching core.
    pub async fn request_ride(&self, request: NewRide) -> Result<Ride, RideError> {
        request.pickup.validate()?;
        request.dropoff.validate()?;

        let mut ride = Ride::requested(
            request.passenger_id,
            request.pickup,
            request.dropoff,
            request.tier,
            self.clock.now(),
        );
        if let Some(payment_id) = request.payment_id {
            ride = ride.with_payment(payment_id);
        }
        self.store.insert_ride(&ride).await?;

        let published = self
            .intake
            .publish(RideRequested {
                ride_id: ride.id.clone(),
                requested_at: ride.requested_at,
            })
            .await;
        if published.is_err() {
            // Nothing would ever arm a deadline for this ride.
            self.withdraw(&ride).await;
            return Err(RideError::IntakeClosed);
        }

        info!(ride_id = %ride.id, tier = %ride.tier, "ride requested");
        Ok(ride)
    }

    pub async fn get_ride(&self, id: &RideId) -> Result<Ride, RideError> {
        self.store
            .get_ride(id)
            .await?
            .ok_or_else(|| RideError::NotFound {
                kind: "ride",
                id: id.to_string(),
            })
    }

    pub async fn cancel_ride(&self, id: &RideId) -> Result<Ride, RideError> {
        let ride = self.update_ride(id, state_machine::cancel).await?;
        info!(ride_id = %id, "ride cancelled by request");
        Ok(ride)
    }

    pub async fn start_ride(&self, id: &RideId) -> Result<Ride, RideError> {
        let now = self.clock.now();
        let ride = self.update_ride(id, |r| state_machine::start(r, now)).await?;
        info!(ride_id = %id, "ride started");
        Ok(ride)
    }

    /// Complete the ride and make its driver available again.
    pub async fn complete_ride(&self, id: &RideId) -> Result<Ride, RideError> {
        let now = self.clock.now();
        let ride = self
            .update_ride(id, |r| state_machine::complete(r, now))
            .await?;
        info!(ride_id = %id, "ride completed");

        if let Some(driver_id) = &ride.driver_id {
            match self
                .store
                .compare_and_set_availability(driver_id, false, true)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(ride_id = %id, driver_id = %driver_id, "driver was already available")
                }
                Err(e) => error!(
                    ride_id = %id,
                    driver_id = %driver_id,
                    error = %e,
                    "could not release driver"
                ),
            }
        }
        Ok(ride)
    }

    /// Register a driver, or move an existing one and change its availability.
    ///
    /// Availability of an existing driver only changes through compare-and-set, and a
    /// driver holding an ACCEPTED or IN_PROGRESS ride cannot be made available.
    pub async fn upsert_driver(
        &self,
        id: DriverId,
        available: bool,
        location: Location,
        vehicle_id: Option<String>,
    ) -> Result<Driver, RideError> {
        location.validate()?;
        let existing = self.store.get_driver(&id).await?;
        if available && existing.as_ref().is_some_and(|d| !d.available) {
            if let Some(ride) = self.store.active_ride_for_driver(&id).await? {
                return Err(RideError::DriverBusy { driver: id, ride });
            }
        }

        let driver = Driver {
            id,
            available,
            location,
            vehicle_id,
        };
        self.store.upsert_driver(&driver).await?;

        if existing.is_some_and(|d| d.available != available)
            && !self
                .store
                .compare_and_set_availability(&driver.id, !available, available)
                .await?
        {
            warn!(driver_id = %driver.id, available, "driver availability changed concurrently");
        }

        let stored = self.get_driver(&driver.id).await?;
        info!(driver_id = %stored.id, available = stored.available, "driver updated");
        Ok(stored)
    }

    pub async fn get_driver(&self, id: &DriverId) -> Result<Driver, RideError> {
        self.store
            .get_driver(id)
            .await?
            .ok_or_else(|| RideError::NotFound {
                kind: "driver",
                id: id.to_string(),
            })
    }

    /// Number of rides currently waiting in REQUESTED.
    pub async fn open_requests(&self) -> Result<usize, RideError> {
        Ok(self.store.requested_ride_ids().await?.len())
    }

    async fn withdraw(&self, ride: &Ride) {
        let cancelled = match state_machine::cancel(ride) {
            Ok(cancelled) => cancelled,
            Err(e) => {
                error!(ride_id = %ride.id, error = %e, "could not withdraw ride");
                return;
            }
        };
        match self
            .store
            .compare_and_set_ride(RideStatus::Requested, &cancelled)
            .await
        {
            Ok(true) => warn!(ride_id = %ride.id, "ride withdrawn: intake closed"),
            Ok(false) => warn!(ride_id = %ride.id, "ride resolved before it could be withdrawn"),
            Err(e) => error!(ride_id = %ride.id, error = %e, "could not withdraw ride"),
        }
    }

    /// Load, transform and compare-and-set keyed on the status that was read.
    async fn update_ride<F>(&self, id: &RideId, step: F) -> Result<Ride, RideError>
    where
        F: FnOnce(&Ride) -> Result<Ride, InvalidTransition>,
    {
        let current = self.get_ride(id).await?;
        let next = step(&current)?;
        if self
            .store
            .compare_and_set_ride(current.status, &next)
            .await?
        {
            Ok(next)
        } else {
            Err(RideError::Conflict(id.clone()))
        }
    }
}
