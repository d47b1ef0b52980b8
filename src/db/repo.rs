//! SQLite implementation of the ride/driver store.

use crate::domain::{
    Decimal, Driver, DriverId, Location, PassengerId, Ride, RideId, RideStatus, RideTier, TimeMs,
};
use crate::store::{RideStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const RIDE_COLUMNS: &str = r#"
    id, status, tier, requested_at_ms, started_at_ms, completed_at_ms, fare_amount,
    pickup_lat, pickup_lon, pickup_address, dropoff_lat, dropoff_lon, dropoff_address,
    passenger_id, driver_id, vehicle_id, payment_id, rating_ids
"#;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }
}

#[async_trait]
impl RideStore for Repository {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), StoreError> {
        let rating_ids = encode_rating_ids(ride)?;
        let result = sqlx::query(
            r#"
            INSERT INTO rides (
                id, status, tier, requested_at_ms, started_at_ms, completed_at_ms, fare_amount,
                pickup_lat, pickup_lon, pickup_address, dropoff_lat, dropoff_lon, dropoff_address,
                passenger_id, driver_id, vehicle_id, payment_id, rating_ids, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(ride.id.as_str())
        .bind(ride.status.as_str())
        .bind(ride.tier.as_str())
        .bind(ride.requested_at.as_ms())
        .bind(ride.started_at.map(|t| t.as_ms()))
        .bind(ride.completed_at.map(|t| t.as_ms()))
        .bind(ride.fare_amount.map(|d| d.to_canonical_string()))
        .bind(ride.pickup.latitude)
        .bind(ride.pickup.longitude)
        .bind(ride.pickup.address.as_deref())
        .bind(ride.dropoff.latitude)
        .bind(ride.dropoff.longitude)
        .bind(ride.dropoff.address.as_deref())
        .bind(ride.passenger_id.as_str())
        .bind(ride.driver_id.as_ref().map(|d| d.as_str()))
        .bind(ride.vehicle_id.as_deref())
        .bind(ride.payment_id.as_deref())
        .bind(rating_ids)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(ride.id.to_string()));
        }
        Ok(())
    }

    async fn get_ride(&self, id: &RideId) -> Result<Option<Ride>, StoreError> {
        let sql = format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(ride_from_row).transpose()
    }

    async fn requested_ride_ids(&self) -> Result<Vec<RideId>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM rides WHERE status = ? ORDER BY requested_at_ms ASC, id ASC",
        )
        .bind(RideStatus::Requested.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RideId::new(row.get::<String, _>("id")))
            .collect())
    }

    async fn compare_and_set_ride(
        &self,
        expected: RideStatus,
        ride: &Ride,
    ) -> Result<bool, StoreError> {
        let rating_ids = encode_rating_ids(ride)?;
        let result = sqlx::query(
            r#"
            UPDATE rides SET
                status = ?, started_at_ms = ?, completed_at_ms = ?, fare_amount = ?,
                driver_id = ?, vehicle_id = ?, payment_id = ?, rating_ids = ?, updated_at_ms = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(ride.status.as_str())
        .bind(ride.started_at.map(|t| t.as_ms()))
        .bind(ride.completed_at.map(|t| t.as_ms()))
        .bind(ride.fare_amount.map(|d| d.to_canonical_string()))
        .bind(ride.driver_id.as_ref().map(|d| d.as_str()))
        .bind(ride.vehicle_id.as_deref())
        .bind(ride.payment_id.as_deref())
        .bind(rating_ids)
        .bind(TimeMs::now().as_ms())
        .bind(ride.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_driver(&self, driver: &Driver) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO drivers (id, available, lat, lon, address, vehicle_id, updated_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                lat = excluded.lat,
                lon = excluded.lon,
                address = excluded.address,
                vehicle_id = excluded.vehicle_id,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(driver.id.as_str())
        .bind(driver.available)
        .bind(driver.location.latitude)
        .bind(driver.location.longitude)
        .bind(driver.location.address.as_deref())
        .bind(driver.vehicle_id.as_deref())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>, StoreError> {
        let row = sqlx::query(
            "SELECT id, available, lat, lon, address, vehicle_id FROM drivers WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Driver {
            id: DriverId::new(r.get::<String, _>("id")),
            available: r.get("available"),
            location: Location {
                latitude: r.get("lat"),
                longitude: r.get("lon"),
                address: r.get("address"),
            },
            vehicle_id: r.get("vehicle_id"),
        }))
    }

    async fn available_driver_ids(&self) -> Result<Vec<DriverId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM drivers WHERE available = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| DriverId::new(row.get::<String, _>("id")))
            .collect())
    }

    async fn active_ride_for_driver(&self, id: &DriverId) -> Result<Option<RideId>, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM rides WHERE driver_id = ? AND status IN (?, ?) ORDER BY id ASC LIMIT 1",
        )
        .bind(id.as_str())
        .bind(RideStatus::Accepted.as_str())
        .bind(RideStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RideId::new(row.get::<String, _>("id"))))
    }

    async fn compare_and_set_availability(
        &self,
        id: &DriverId,
        expected: bool,
        new: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE drivers SET available = ?, updated_at_ms = ? WHERE id = ? AND available = ?",
        )
        .bind(new)
        .bind(TimeMs::now().as_ms())
        .bind(id.as_str())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn encode_rating_ids(ride: &Ride) -> Result<String, StoreError> {
    serde_json::to_string(&ride.rating_ids).map_err(|e| StoreError::Corrupt {
        id: ride.id.to_string(),
        reason: e.to_string(),
    })
}

fn ride_from_row(row: &SqliteRow) -> Result<Ride, StoreError> {
    let id: String = row.get("id");
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };

    let status_str: String = row.get("status");
    let status = RideStatus::from_str(&status_str).map_err(|e| corrupt(e.to_string()))?;
    let tier_str: String = row.get("tier");
    let tier = RideTier::from_str(&tier_str).map_err(|e| corrupt(e.to_string()))?;
    let fare_amount = row
        .get::<Option<String>, _>("fare_amount")
        .map(|s| Decimal::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(format!("fare_amount: {e}")))?;
    let rating_ids_json: String = row.get("rating_ids");
    let rating_ids: Vec<String> =
        serde_json::from_str(&rating_ids_json).map_err(|e| corrupt(format!("rating_ids: {e}")))?;

    Ok(Ride {
        id: RideId::new(id.clone()),
        status,
        tier,
        requested_at: TimeMs::new(row.get("requested_at_ms")),
        started_at: row.get::<Option<i64>, _>("started_at_ms").map(TimeMs::new),
        completed_at: row.get::<Option<i64>, _>("completed_at_ms").map(TimeMs::new),
        fare_amount,
        pickup: Location {
            latitude: row.get("pickup_lat"),
            longitude: row.get("pickup_lon"),
            address: row.get("pickup_address"),
        },
        dropoff: Location {
            latitude: row.get("dropoff_lat"),
            longitude: row.get("dropoff_lon"),
            address: row.get("dropoff_address"),
        },
        passenger_id: PassengerId::new(row.get::<String, _>("passenger_id")),
        driver_id: row.get::<Option<String>, _>("driver_id").map(DriverId::new),
        vehicle_id: row.get("vehicle_id"),
        payment_id: row.get("payment_id"),
        rating_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::engine::state_machine;
    use tempfile::TempDir;

    async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn ride(id: &str, requested_at: i64) -> Ride {
        Ride::requested(
            PassengerId::new("p1"),
            Location::new(52.52, 13.405).unwrap().with_address("Alexanderplatz"),
            Location::new(52.5163, 13.3777).unwrap(),
            RideTier::Premium,
            TimeMs::new(requested_at),
        )
        .with_id(RideId::new(id))
        .with_payment("pay-1")
    }

    fn driver(id: &str) -> Driver {
        Driver::available(DriverId::new(id), Location::new(52.5, 13.4).unwrap())
            .with_vehicle("B-XY-123")
    }

    #[tokio::test]
    async fn test_ride_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let mut original = ride("r1", 1_000);
        original.rating_ids = vec!["rating-1".to_string()];
        repo.insert_ride(&original).await.unwrap();

        let loaded = repo.get_ride(&RideId::new("r1")).await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_get_missing_ride_is_none() {
        let (repo, _temp) = setup_repo().await;
        assert!(repo.get_ride(&RideId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let (repo, _temp) = setup_repo().await;
        repo.insert_ride(&ride("r1", 1_000)).await.unwrap();
        let err = repo.insert_ride(&ride("r1", 2_000)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_requested_ids_ordered_by_request_time() {
        let (repo, _temp) = setup_repo().await;
        repo.insert_ride(&ride("late", 3_000)).await.unwrap();
        repo.insert_ride(&ride("early", 1_000)).await.unwrap();

        let ids = repo.requested_ride_ids().await.unwrap();
        assert_eq!(ids, vec![RideId::new("early"), RideId::new("late")]);
    }

    #[tokio::test]
    async fn test_compare_and_set_ride() {
        let (repo, _temp) = setup_repo().await;
        let original = ride("r1", 1_000);
        repo.insert_ride(&original).await.unwrap();

        let assigned =
            state_machine::assign(&original, &driver("d1"), Decimal::from_cents(1450)).unwrap();
        assert!(repo
            .compare_and_set_ride(RideStatus::Requested, &assigned)
            .await
            .unwrap());

        // A cancellation racing behind the assignment loses.
        let cancelled = state_machine::cancel(&original).unwrap();
        assert!(!repo
            .compare_and_set_ride(RideStatus::Requested, &cancelled)
            .await
            .unwrap());

        let loaded = repo.get_ride(&RideId::new("r1")).await.unwrap().unwrap();
        assert_eq!(loaded.status, RideStatus::Accepted);
        assert_eq!(loaded.driver_id, Some(DriverId::new("d1")));
        assert_eq!(loaded.vehicle_id.as_deref(), Some("B-XY-123"));
        assert_eq!(loaded.fare_amount, Some(Decimal::from_cents(1450)));
        assert!(repo.requested_ride_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_driver_upsert_and_availability() {
        let (repo, _temp) = setup_repo().await;
        repo.upsert_driver(&driver("d2")).await.unwrap();
        repo.upsert_driver(&driver("d1")).await.unwrap();
        assert_eq!(
            repo.available_driver_ids().await.unwrap(),
            vec![DriverId::new("d1"), DriverId::new("d2")]
        );

        let id = DriverId::new("d1");
        assert!(repo.compare_and_set_availability(&id, true, false).await.unwrap());
        assert!(!repo.compare_and_set_availability(&id, true, false).await.unwrap());
        assert_eq!(repo.available_driver_ids().await.unwrap(), vec![DriverId::new("d2")]);

        let loaded = repo.get_driver(&id).await.unwrap().unwrap();
        assert!(!loaded.available);
        assert_eq!(loaded.vehicle_id.as_deref(), Some("B-XY-123"));

        // Re-upserting an existing driver moves it but keeps the claim.
        let mut moved = driver("d1").with_vehicle("B-ZZ-999");
        moved.location = Location::new(48.85, 2.35).unwrap();
        repo.upsert_driver(&moved).await.unwrap();
        let loaded = repo.get_driver(&id).await.unwrap().unwrap();
        assert!(!loaded.available);
        assert_eq!(loaded.location.latitude, 48.85);
        assert_eq!(loaded.vehicle_id.as_deref(), Some("B-ZZ-999"));
    }

    #[tokio::test]
    async fn test_active_ride_for_driver() {
        let (repo, _temp) = setup_repo().await;
        let d1 = DriverId::new("d1");
        let original = ride("r1", 1_000);
        repo.insert_ride(&original).await.unwrap();
        assert_eq!(repo.active_ride_for_driver(&d1).await.unwrap(), None);

        let assigned =
            state_machine::assign(&original, &driver("d1"), Decimal::from_cents(900)).unwrap();
        repo.compare_and_set_ride(RideStatus::Requested, &assigned)
            .await
            .unwrap();
        assert_eq!(
            repo.active_ride_for_driver(&d1).await.unwrap(),
            Some(RideId::new("r1"))
        );

        let started = state_machine::start(&assigned, TimeMs::new(2_000)).unwrap();
        repo.compare_and_set_ride(RideStatus::Accepted, &started)
            .await
            .unwrap();
        assert!(repo.active_ride_for_driver(&d1).await.unwrap().is_some());

        let completed = state_machine::complete(&started, TimeMs::new(3_000)).unwrap();
        repo.compare_and_set_ride(RideStatus::InProgress, &completed)
            .await
            .unwrap();
        assert_eq!(repo.active_ride_for_driver(&d1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_availability_on_missing_driver_is_false() {
        let (repo, _temp) = setup_repo().await;
        assert!(!repo
            .compare_and_set_availability(&DriverId::new("ghost"), true, false)
            .await
            .unwrap());
    }
}
