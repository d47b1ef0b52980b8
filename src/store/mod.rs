//! Persisted-state contract for rides and drivers.
//!
//! Both status changes and driver claims go through optimistic compare-and-set: a write
//! succeeds only when the stored value still matches the expected prior value, and a losing
//! writer gets `Ok(false)` instead of blocking.

use crate::domain::{Driver, DriverId, Ride, RideId, RideStatus};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

#[async_trait]
pub trait RideStore: Send + Sync + fmt::Debug {
    /// Insert a new ride. Fails with `StoreError::Duplicate` if the id exists.
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError>;

    async fn get_ride(&self, id: &RideId) -> Result<Option<Ride>, StoreError>;

    /// Ids of all rides currently in REQUESTED.
    async fn requested_ride_ids(&self) -> Result<Vec<RideId>, StoreError>;

    /// Replace the stored ride with `ride` iff its stored status equals `expected`.
    ///
    /// Returns `Ok(false)` if the status changed underneath or the ride does not exist.
    async fn compare_and_set_ride(
        &self,
        expected: RideStatus,
        ride: &Ride,
    ) -> Result<bool, StoreError>;

    /// Insert a new driver, or update the location and vehicle of an existing one.
    ///
    /// The stored availability of an existing driver is left untouched; it only changes
    /// through `compare_and_set_availability`.
    async fn upsert_driver(&self, driver: &Driver) -> Result<(), StoreError>;

    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>, StoreError>;

    /// Ids of all drivers currently flagged available.
    async fn available_driver_ids(&self) -> Result<Vec<DriverId>, StoreError>;

    /// Lowest id among the ACCEPTED or IN_PROGRESS rides assigned to driver `id`.
    async fn active_ride_for_driver(&self, id: &DriverId) -> Result<Option<RideId>, StoreError>;

    /// Set the availability flag to `new` iff it currently equals `expected`.
    ///
    /// Returns `Ok(false)` if the flag differed or the driver does not exist.
    async fn compare_and_set_availability(
        &self,
        id: &DriverId,
        expected: bool,
        new: bool,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("duplicate id: {0}")]
    Duplicate(String),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
