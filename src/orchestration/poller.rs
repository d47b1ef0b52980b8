//! Periodic matching of REQUESTED rides to available drivers.

use crate::domain::{Decimal, Driver, DriverId, MatchEvent, Ride, RideId, RideStatus, TimeMs};
use crate::engine::{
    demand_multiplier, distance_km, estimate_duration_min, rank_candidates, state_machine,
    FareError, InvalidTransition,
};
use crate::orchestration::clock::Clock;
use crate::orchestration::events::EventProducer;
use crate::store::{RideStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("ride not found: {0}")]
    NotFound(RideId),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("ride {0} was resolved concurrently")]
    ConcurrentConflict(RideId),
    #[error(transparent)]
    Fare(#[from] FareError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters for one poll tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub conflicts: usize,
    pub failed: usize,
    /// The tick found another tick still running and did nothing.
    pub skipped: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Tunables for the poller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub avg_speed_kmh: f64,
    pub surge_cap: f64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            avg_speed_kmh: 40.0,
            surge_cap: 2.0,
        }
    }
}

#[derive(Clone)]
pub struct DriverAvailabilityPoller {
    store: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
    events: EventProducer<MatchEvent>,
    tick_guard: Arc<Mutex<()>>,
}

impl DriverAvailabilityPoller {
    pub fn new(
        store: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
        events: EventProducer<MatchEvent>,
    ) -> Self {
        let settings = PollerSettings {
            interval: settings.interval.max(Duration::from_millis(1)),
            ..settings
        };
        Self {
            store,
            clock,
            settings,
            events,
            tick_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Tick every interval until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Intervals that elapse while a tick is running are skipped rather than queued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.settings.interval;
        info!(interval_ms = interval.as_millis() as u64, "driver availability poller started");

        let mut next = self.clock.now().plus(interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let signalled = tokio::select! {
                _ = self.clock.sleep_until(next) => None,
                changed = shutdown.changed() => Some(changed.is_ok()),
            };
            match signalled {
                None => {}
                Some(true) => continue,
                Some(false) => break,
            }

            let report = self.tick().await;
            debug!(?report, "poll tick finished");
            next = next_deadline(next, self.clock.now(), interval);
        }
        info!("driver availability poller stopped");
    }

    /// Run one matching pass over every REQUESTED ride.
    pub async fn tick(&self) -> TickReport {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("previous poll tick still running, skipping");
            return TickReport::skipped();
        };

        let mut report = TickReport::default();

        let ride_ids = match self.store.requested_ride_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "could not list requested rides");
                return report;
            }
        };
        report.scanned = ride_ids.len();
        if ride_ids.is_empty() {
            return report;
        }

        let mut drivers = self.load_available_drivers().await;
        let demand = demand_multiplier(ride_ids.len(), drivers.len(), self.settings.surge_cap);

        let mut rides = Vec::with_capacity(ride_ids.len());
        for id in &ride_ids {
            match self.store.get_ride(id).await {
                Ok(Some(ride)) if ride.status == RideStatus::Requested => rides.push(ride),
                Ok(Some(_)) => debug!(ride_id = %id, "ride left REQUESTED before matching"),
                Ok(None) => {
                    warn!(ride_id = %id, "listed ride vanished");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(ride_id = %id, error = %e, "could not load ride, retrying next tick");
                    report.failed += 1;
                }
            }
        }
        rides.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        for ride in rides {
            match self.match_ride(&ride, &drivers, demand).await {
                Ok(Some((driver_id, fare))) => {
                    report.matched += 1;
                    drivers.retain(|d| d.id != driver_id);
                    self.events.publish_nowait(MatchEvent::RideMatched {
                        ride_id: ride.id.clone(),
                        driver_id,
                        fare,
                    });
                }
                Ok(None) => report.unmatched += 1,
                Err(MatchError::ConcurrentConflict(id)) => {
                    debug!(ride_id = %id, "ride resolved during matching");
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(ride_id = %ride.id, error = %e, "matching failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn load_available_drivers(&self) -> Vec<Driver> {
        let ids = match self.store.available_driver_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "could not list available drivers");
                return Vec::new();
            }
        };
        let mut drivers = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get_driver(&id).await {
                Ok(Some(driver)) if driver.available => drivers.push(driver),
                Ok(_) => {}
                Err(e) => warn!(driver_id = %id, error = %e, "skipping driver"),
            }
        }
        drivers
    }

    /// Try candidates nearest-first until one can be claimed and the ride assigned.
    ///
    /// Returns `Ok(None)` when no candidate could be claimed.
    async fn match_ride(
        &self,
        ride: &Ride,
        drivers: &[Driver],
        demand: f64,
    ) -> Result<Option<(DriverId, Decimal)>, MatchError> {
        let trip_km = distance_km(&ride.pickup, &ride.dropoff);
        let duration_min = estimate_duration_min(trip_km, self.settings.avg_speed_kmh);
        let fare = ride.tier.calculate_fare(trip_km, duration_min, demand)?;

        for candidate in rank_candidates(&ride.pickup, drivers) {
            let driver = candidate.driver;
            let assigned = state_machine::assign(ride, &driver, fare)?;

            if !self
                .store
                .compare_and_set_availability(&driver.id, true, false)
                .await?
            {
                debug!(ride_id = %ride.id, driver_id = %driver.id, "driver claimed elsewhere");
                continue;
            }

            match self
                .store
                .compare_and_set_ride(RideStatus::Requested, &assigned)
                .await
            {
                Ok(true) => {
                    // An availability update between claim and assignment can see no
                    // active ride and flip the driver back on; take it back.
                    match self
                        .store
                        .compare_and_set_availability(&driver.id, true, false)
                        .await
                    {
                        Ok(false) => {}
                        Ok(true) => {
                            warn!(ride_id = %ride.id, driver_id = %driver.id, "driver re-claimed")
                        }
                        Err(e) => error!(
                            ride_id = %ride.id,
                            driver_id = %driver.id,
                            error = %e,
                            "could not re-claim driver"
                        ),
                    }
                    info!(
                        ride_id = %ride.id,
                        driver_id = %driver.id,
                        fare = %fare.to_money_string(),
                        pickup_km = candidate.pickup_distance_km,
                        "ride matched"
                    );
                    return Ok(Some((driver.id, fare)));
                }
                Ok(false) => {
                    self.release(&driver.id).await;
                    return Err(MatchError::ConcurrentConflict(ride.id.clone()));
                }
                Err(e) => {
                    self.release(&driver.id).await;
                    return Err(e.into());
                }
            }
        }

        debug!(ride_id = %ride.id, "no driver available");
        Ok(None)
    }

    async fn release(&self, driver_id: &DriverId) {
        match self
            .store
            .compare_and_set_availability(driver_id, false, true)
            .await
        {
            Ok(true) => debug!(driver_id = %driver_id, "driver released"),
            Ok(false) => {
                warn!(driver_id = %driver_id, "driver availability changed before release")
            }
            Err(e) => error!(driver_id = %driver_id, error = %e, "could not release driver"),
        }
    }
}

impl std::fmt::Debug for DriverAvailabilityPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverAvailabilityPoller")
            .field("settings", &self.settings)
            .finish()
    }
}

/// First deadline on the `prev + k * interval` grid strictly after `now`.
fn next_deadline(prev: TimeMs, now: TimeMs, interval: Duration) -> TimeMs {
    let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let behind = now.as_ms().saturating_sub(prev.as_ms());
    if behind < 0 {
        return prev.plus(interval);
    }
    let missed = behind / step;
    TimeMs::new(
        prev.as_ms()
            .saturating_add(missed.saturating_add(1).saturating_mul(step)),
    )
}
