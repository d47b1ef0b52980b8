use ridematch::db::init_db;
use ridematch::orchestration::{
    events, DriverAvailabilityPoller, FireOutcome, ManualClock, MatchTimeoutScheduler,
    MatchingCoordinator, PollerSettings, RideError, RideService,
};
use ridematch::{
    Driver, DriverId, InMemoryStore, Location, MatchEvent, PassengerId, Repository, Ride, RideId,
    RideRequested, RideStatus, RideStore, RideTier, TimeMs,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const WINDOW: Duration = Duration::from_secs(300);

fn loc(lat: f64, lon: f64) -> Location {
    Location::new(lat, lon).unwrap()
}

fn ride(id: &str, requested_at: i64) -> Ride {
    Ride::requested(
        PassengerId::new("passenger"),
        loc(40.7128, -74.0060),
        loc(40.7306, -73.9352),
        RideTier::Standard,
        TimeMs::new(requested_at),
    )
    .with_id(RideId::new(id))
}

fn driver(id: &str) -> Driver {
    Driver::available(DriverId::new(id), loc(40.7130, -74.0050))
}

struct Harness {
    store: Arc<dyn RideStore>,
    clock: Arc<ManualClock>,
    scheduler: MatchTimeoutScheduler,
    poller: DriverAvailabilityPoller,
    outcomes: mpsc::Receiver<MatchEvent>,
}

fn harness(store: Arc<dyn RideStore>, start: i64) -> Harness {
    let clock = Arc::new(ManualClock::new(TimeMs::new(start)));
    let (producer, outcomes) = events::channel(64);
    let scheduler =
        MatchTimeoutScheduler::new(store.clone(), clock.clone(), WINDOW, producer.clone());
    let poller = DriverAvailabilityPoller::new(
        store.clone(),
        clock.clone(),
        PollerSettings::default(),
        producer,
    );
    Harness {
        store,
        clock,
        scheduler,
        poller,
        outcomes,
    }
}

async fn stored(store: &Arc<dyn RideStore>, id: &str) -> Ride {
    store.get_ride(&RideId::new(id)).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_unmatched_ride_cancelled_at_deadline_never_before() {
    let h = harness(Arc::new(InMemoryStore::new().with_ride(ride("r1", 0))), 0);
    let coordinator = MatchingCoordinator::new(h.scheduler.clone());

    let timeout = coordinator
        .on_ride_requested(RideRequested {
            ride_id: RideId::new("r1"),
            requested_at: TimeMs::new(0),
        })
        .unwrap();

    // no drivers: polling does nothing
    h.clock.advance(Duration::from_secs(150));
    assert_eq!(h.poller.tick().await.unmatched, 1);
    h.clock.advance(Duration::from_millis(149_999));
    tokio::task::yield_now().await;
    assert!(!timeout.is_finished());
    assert_eq!(stored(&h.store, "r1").await.status, RideStatus::Requested);

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(timeout.await.unwrap(), FireOutcome::Cancelled);
    assert_eq!(stored(&h.store, "r1").await.status, RideStatus::Cancelled);

    // terminal: a late driver does not revive it
    h.store.upsert_driver(&driver("late")).await.unwrap();
    let report = h.poller.tick().await;
    assert_eq!(report.scanned, 0);
    assert_eq!(stored(&h.store, "r1").await.status, RideStatus::Cancelled);
}

#[tokio::test]
async fn test_ride_matched_before_deadline_survives_fire() {
    let mut h = harness(Arc::new(InMemoryStore::new().with_ride(ride("r1", 0))), 0);
    let timeout = h.scheduler.arm(RideId::new("r1"), TimeMs::new(0)).unwrap();

    h.clock.advance(Duration::from_secs(120));
    h.store.upsert_driver(&driver("d1")).await.unwrap();
    assert_eq!(h.poller.tick().await.matched, 1);

    let matched = stored(&h.store, "r1").await;
    assert_eq!(matched.status, RideStatus::Accepted);
    assert_eq!(matched.driver_id, Some(DriverId::new("d1")));

    h.clock.advance(Duration::from_secs(180));
    assert_eq!(
        timeout.await.unwrap(),
        FireOutcome::AlreadyResolved(RideStatus::Accepted)
    );
    assert_eq!(stored(&h.store, "r1").await, matched);

    match h.outcomes.recv().await {
        Some(MatchEvent::RideMatched {
            ride_id, driver_id, ..
        }) => {
            assert_eq!(ride_id, RideId::new("r1"));
            assert_eq!(driver_id, DriverId::new("d1"));
        }
        other => panic!("expected RideMatched, got {other:?}"),
    }
    assert!(h.outcomes.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tick_and_fire_resolve_exactly_once() {
    for round in 0..25 {
        let store: Arc<dyn RideStore> = Arc::new(
            InMemoryStore::new()
                .with_ride(ride("r1", 0))
                .with_driver(driver("d1")),
        );
        let h = harness(store, 300_000);

        let poller = h.poller.clone();
        let tick = tokio::spawn(async move { poller.tick().await });
        let fire = h.scheduler.arm(RideId::new("r1"), TimeMs::new(0)).unwrap();

        let report = tick.await.unwrap();
        let outcome = fire.await.unwrap();
        let ride = stored(&h.store, "r1").await;
        let d1 = h.store.get_driver(&DriverId::new("d1")).await.unwrap().unwrap();

        match ride.status {
            RideStatus::Accepted => {
                assert_eq!(report.matched, 1, "round {round}");
                assert_ne!(outcome, FireOutcome::Cancelled, "round {round}");
                assert_eq!(ride.driver_id, Some(DriverId::new("d1")));
                assert!(!d1.available);
            }
            RideStatus::Cancelled => {
                assert_eq!(report.matched, 0, "round {round}");
                assert_eq!(outcome, FireOutcome::Cancelled, "round {round}");
                assert_eq!(ride.driver_id, None);
                assert!(d1.available);
            }
            other => panic!("round {round}: unexpected status {other}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_pollers_claim_one_driver_once() {
    let store: Arc<dyn RideStore> = Arc::new(
        InMemoryStore::new()
            .with_ride(ride("r1", 0))
            .with_ride(ride("r2", 1))
            .with_driver(driver("d1")),
    );
    let a = harness(store.clone(), 0);
    let b = harness(store.clone(), 0);

    let (ra, rb) = tokio::join!(
        tokio::spawn({
            let p = a.poller.clone();
            async move { p.tick().await }
        }),
        tokio::spawn({
            let p = b.poller.clone();
            async move { p.tick().await }
        })
    );
    let matched = ra.unwrap().matched + rb.unwrap().matched;
    assert_eq!(matched, 1);

    let r1 = stored(&store, "r1").await;
    let r2 = stored(&store, "r2").await;
    let accepted: Vec<_> = [&r1, &r2]
        .into_iter()
        .filter(|r| r.status == RideStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].driver_id, Some(DriverId::new("d1")));
    let loser = if r1.status == RideStatus::Accepted { &r2 } else { &r1 };
    assert_eq!(loser.status, RideStatus::Requested);
    assert_eq!(loser.driver_id, None);
}

#[tokio::test]
async fn test_sqlite_restart_rearms_pending_timeouts() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("rides.db")
        .to_string_lossy()
        .to_string();

    {
        let repo = Repository::new(init_db(&db_path).await.unwrap());
        repo.insert_ride(&ride("pending", 60_000)).await.unwrap();
        let mut done = ride("done", 0);
        done.status = RideStatus::Cancelled;
        repo.insert_ride(&done).await.unwrap();
    }

    let store: Arc<dyn RideStore> = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
    let h = harness(store, 100_000);
    assert_eq!(h.scheduler.recover().await.unwrap(), 1);
    assert_eq!(h.scheduler.armed_count(), 1);

    h.clock.set(TimeMs::new(359_999));
    tokio::task::yield_now().await;
    assert_eq!(stored(&h.store, "pending").await.status, RideStatus::Requested);

    h.clock.set(TimeMs::new(360_000));
    for _ in 0..100 {
        if h.scheduler.armed_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.scheduler.armed_count(), 0);
    assert_eq!(stored(&h.store, "pending").await.status, RideStatus::Cancelled);
}

#[tokio::test]
async fn test_sqlite_match_claims_driver_and_vehicle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("rides.db")
        .to_string_lossy()
        .to_string();
    let store: Arc<dyn RideStore> = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
    store.insert_ride(&ride("r1", 0)).await.unwrap();
    store
        .upsert_driver(&driver("d1").with_vehicle("car-7"))
        .await
        .unwrap();

    let h = harness(store, 1_000);
    let report = h.poller.tick().await;
    assert_eq!(report.matched, 1);

    let matched = stored(&h.store, "r1").await;
    assert_eq!(matched.status, RideStatus::Accepted);
    assert_eq!(matched.vehicle_id.as_deref(), Some("car-7"));
    assert!(matched.fare_amount.is_some());
    let d1 = h.store.get_driver(&DriverId::new("d1")).await.unwrap().unwrap();
    assert!(!d1.available);
}

#[tokio::test]
async fn test_assigned_driver_update_cannot_double_book() {
    let store = InMemoryStore::new()
        .with_ride(ride("r1", 0))
        .with_driver(driver("d1"));
    let h = harness(Arc::new(store), 1_000);
    let (intake, _intake_rx) = events::channel(4);
    let service = RideService::new(h.store.clone(), h.clock.clone(), intake);

    assert_eq!(h.poller.tick().await.matched, 1);
    assert_eq!(stored(&h.store, "r1").await.status, RideStatus::Accepted);

    // The assigned driver's app still reports itself available.
    let update = service
        .upsert_driver(DriverId::new("d1"), true, loc(40.7140, -74.0040), None)
        .await;
    assert!(matches!(update, Err(RideError::DriverBusy { .. })));

    h.store.insert_ride(&ride("r2", 500)).await.unwrap();
    let report = h.poller.tick().await;
    assert_eq!(report.matched, 0);
    assert_eq!(report.unmatched, 1);
    assert_eq!(stored(&h.store, "r2").await.status, RideStatus::Requested);

    let d1 = h.store.get_driver(&DriverId::new("d1")).await.unwrap().unwrap();
    assert!(!d1.available);
    assert_eq!(stored(&h.store, "r1").await.driver_id, Some(DriverId::new("d1")));
}
