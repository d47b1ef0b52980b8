//! In-memory store for tests and single-process runs.

use super::{RideStore, StoreError};
use crate::domain::{Driver, DriverId, Ride, RideId, RideStatus};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    rides: HashMap<RideId, Ride>,
    drivers: HashMap<DriverId, Driver>,
    failing_rides: HashSet<RideId>,
    failing_drivers: HashSet<DriverId>,
}

/// `RideStore` backed by hash maps behind a single mutex.
///
/// Every operation holds the lock for its whole read-check-write, which makes the
/// compare-and-set operations atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ride.
    pub fn with_ride(self, ride: Ride) -> Self {
        self.lock().rides.insert(ride.id.clone(), ride);
        self
    }

    /// Seed a driver.
    pub fn with_driver(self, driver: Driver) -> Self {
        self.lock().drivers.insert(driver.id.clone(), driver);
        self
    }

    /// Make every lookup of `id` fail with `StoreError::Unavailable`.
    pub fn with_failing_ride(self, id: RideId) -> Self {
        self.lock().failing_rides.insert(id);
        self
    }

    /// Every stored ride, ordered by id.
    pub fn all_rides(&self) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self.lock().rides.values().cloned().collect();
        rides.sort_by(|a, b| a.id.cmp(&b.id));
        rides
    }

    /// Stop failing lookups of ride `id`.
    pub fn clear_failing_ride(&self, id: &RideId) {
        self.lock().failing_rides.remove(id);
    }

    /// Make every lookup of driver `id` fail with `StoreError::Unavailable`.
    pub fn with_failing_driver(self, id: DriverId) -> Self {
        self.lock().failing_drivers.insert(id);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Writes are single map operations, so a poisoned map is still consistent.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RideStore for InMemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.rides.contains_key(&ride.id) {
            return Err(StoreError::Duplicate(ride.id.to_string()));
        }
        tables.rides.insert(ride.id.clone(), ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: &RideId) -> Result<Option<Ride>, StoreError> {
        let tables = self.lock();
        if tables.failing_rides.contains(id) {
            return Err(StoreError::Unavailable(format!("ride {id}")));
        }
        Ok(tables.rides.get(id).cloned())
    }

    async fn requested_ride_ids(&self) -> Result<Vec<RideId>, StoreError> {
        let tables = self.lock();
        let mut ids: Vec<RideId> = tables
            .rides
            .values()
            .filter(|r| r.status == RideStatus::Requested)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn compare_and_set_ride(
        &self,
        expected: RideStatus,
        ride: &Ride,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        if tables.failing_rides.contains(&ride.id) {
            return Err(StoreError::Unavailable(format!("ride {}", ride.id)));
        }
        match tables.rides.get_mut(&ride.id) {
            Some(stored) if stored.status == expected => {
                *stored = ride.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_driver(&self, driver: &Driver) -> Result<(), StoreError> {
        self.lock()
            .drivers
            .entry(driver.id.clone())
            .and_modify(|stored| {
                stored.location = driver.location.clone();
                stored.vehicle_id = driver.vehicle_id.clone();
            })
            .or_insert_with(|| driver.clone());
        Ok(())
    }

    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>, StoreError> {
        let tables = self.lock();
        if tables.failing_drivers.contains(id) {
            return Err(StoreError::Unavailable(format!("driver {id}")));
        }
        Ok(tables.drivers.get(id).cloned())
    }

    async fn available_driver_ids(&self) -> Result<Vec<DriverId>, StoreError> {
        let tables = self.lock();
        let mut ids: Vec<DriverId> = tables
            .drivers
            .values()
            .filter(|d| d.available)
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn active_ride_for_driver(&self, id: &DriverId) -> Result<Option<RideId>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .rides
            .values()
            .filter(|r| r.driver_id.as_ref() == Some(id))
            .filter(|r| matches!(r.status, RideStatus::Accepted | RideStatus::InProgress))
            .map(|r| r.id.clone())
            .min())
    }

    async fn compare_and_set_availability(
        &self,
        id: &DriverId,
        expected: bool,
        new: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        if tables.failing_drivers.contains(id) {
            return Err(StoreError::Unavailable(format!("driver {id}")));
        }
        match tables.drivers.get_mut(id) {
            Some(driver) if driver.available == expected => {
                driver.available = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, PassengerId, RideTier, TimeMs};
    use std::sync::Arc;

    fn ride(id: &str) -> Ride {
        Ride::requested(
            PassengerId::new("p1"),
            Location::new(0.0, 0.0).unwrap(),
            Location::new(0.1, 0.1).unwrap(),
            RideTier::Standard,
            TimeMs::new(0),
        )
        .with_id(RideId::new(id))
    }

    fn driver(id: &str) -> Driver {
        Driver::available(DriverId::new(id), Location::new(0.0, 0.0).unwrap())
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.insert_ride(&ride("r1")).await.unwrap();
        let err = store.insert_ride(&ride("r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_compare_and_set_ride_checks_status() {
        let store = InMemoryStore::new().with_ride(ride("r1"));
        let mut cancelled = ride("r1");
        cancelled.status = RideStatus::Cancelled;

        assert!(!store
            .compare_and_set_ride(RideStatus::Accepted, &cancelled)
            .await
            .unwrap());
        assert!(store
            .compare_and_set_ride(RideStatus::Requested, &cancelled)
            .await
            .unwrap());
        // Second writer with the same expectation loses.
        assert!(!store
            .compare_and_set_ride(RideStatus::Requested, &cancelled)
            .await
            .unwrap());

        let stored = store.get_ride(&RideId::new("r1")).await.unwrap().unwrap();
        assert_eq!(stored.status, RideStatus::Cancelled);
        assert!(store.requested_ride_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_set_missing_ride_is_false() {
        let store = InMemoryStore::new();
        assert!(!store
            .compare_and_set_ride(RideStatus::Requested, &ride("ghost"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_availability_claim_and_release() {
        let store = InMemoryStore::new().with_driver(driver("d1"));
        let id = DriverId::new("d1");

        assert!(store.compare_and_set_availability(&id, true, false).await.unwrap());
        assert!(!store.compare_and_set_availability(&id, true, false).await.unwrap());
        assert!(store.available_driver_ids().await.unwrap().is_empty());

        assert!(store.compare_and_set_availability(&id, false, true).await.unwrap());
        assert_eq!(store.available_driver_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_upsert_existing_driver_keeps_availability() {
        let store = InMemoryStore::new().with_driver(driver("d1"));
        let id = DriverId::new("d1");
        assert!(store.compare_and_set_availability(&id, true, false).await.unwrap());

        let moved = Driver::available(id.clone(), Location::new(1.0, 1.0).unwrap())
            .with_vehicle("v2");
        store.upsert_driver(&moved).await.unwrap();

        let stored = store.get_driver(&id).await.unwrap().unwrap();
        assert!(!stored.available);
        assert_eq!(stored.location.latitude, 1.0);
        assert_eq!(stored.vehicle_id.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_active_ride_for_driver() {
        let mut accepted = ride("r2");
        accepted.status = RideStatus::Accepted;
        accepted.driver_id = Some(DriverId::new("d1"));
        let mut done = ride("r1");
        done.status = RideStatus::Completed;
        done.driver_id = Some(DriverId::new("d1"));
        let store = InMemoryStore::new().with_ride(accepted).with_ride(done);

        assert_eq!(
            store.active_ride_for_driver(&DriverId::new("d1")).await.unwrap(),
            Some(RideId::new("r2"))
        );
        assert_eq!(
            store.active_ride_for_driver(&DriverId::new("d2")).await.unwrap(),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryStore::new().with_driver(driver("d1")));
        let claims = (0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .compare_and_set_availability(&DriverId::new("d1"), true, false)
                    .await
                    .unwrap()
            })
        });
        let results = futures::future::join_all(claims).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryStore::new()
            .with_ride(ride("r1"))
            .with_failing_ride(RideId::new("r1"))
            .with_driver(driver("d1"))
            .with_failing_driver(DriverId::new("d1"));
        assert!(store.get_ride(&RideId::new("r1")).await.is_err());
        assert!(store.get_driver(&DriverId::new("d1")).await.is_err());
        // Listings still succeed; only the record lookups fail.
        assert_eq!(store.requested_ride_ids().await.unwrap().len(), 1);
        assert_eq!(store.available_driver_ids().await.unwrap().len(), 1);

        store.clear_failing_ride(&RideId::new("r1"));
        assert!(store.get_ride(&RideId::new("r1")).await.unwrap().is_some());
        assert_eq!(store.all_rides().len(), 1);
    }
}
