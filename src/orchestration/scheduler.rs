//! Deadline-driven cancellation of unmatched rides.
//!
//! Each armed ride gets one task that sleeps until `requested_at + window` and then runs a
//! check-on-fire: if the ride is still REQUESTED it is compare-and-set to CANCELLED, otherwise
//! nothing happens. The poller never talks to the scheduler; a ride it matched simply fails
//! the check. A check that fails on the store is retried after [`FIRE_RETRY_DELAY`] until it
//! gets an answer.

use crate::domain::{MatchEvent, RideId, RideStatus, TimeMs};
use crate::engine::state_machine;
use crate::orchestration::clock::Clock;
use crate::orchestration::events::EventProducer;
use crate::store::{RideStore, StoreError};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before a deadline check that hit a store error runs again.
pub const FIRE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A pending deadline in the scheduler's working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCancellation {
    pub ride_id: RideId,
    pub fire_at: TimeMs,
}

/// What a deadline fire did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The ride was still REQUESTED and is now CANCELLED.
    Cancelled,
    /// The ride had already left REQUESTED.
    AlreadyResolved(RideStatus),
    /// Another writer changed the ride between the read and the compare-and-set.
    Conflict,
    NotFound,
    Failed(String),
}

#[derive(Clone)]
pub struct MatchTimeoutScheduler {
    store: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    armed: Arc<Mutex<HashMap<RideId, TimeMs>>>,
    events: EventProducer<MatchEvent>,
}

impl MatchTimeoutScheduler {
    pub fn new(
        store: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        events: EventProducer<MatchEvent>,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            armed: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule the cancellation check for a ride requested at `requested_at`.
    ///
    /// Returns `None` if the ride already has a pending deadline. The handle resolves with the
    /// first outcome that is not [`FireOutcome::Failed`].
    pub fn arm(&self, ride_id: RideId, requested_at: TimeMs) -> Option<JoinHandle<FireOutcome>> {
        let fire_at = requested_at.plus(self.window);
        {
            let mut armed = self.armed();
            if armed.contains_key(&ride_id) {
                debug!(ride_id = %ride_id, "timeout already armed");
                return None;
            }
            armed.insert(ride_id.clone(), fire_at);
        }
        debug!(ride_id = %ride_id, fire_at = %fire_at, "timeout armed");

        let this = self.clone();
        Some(tokio::spawn(async move {
            let mut fire_at = fire_at;
            loop {
                this.clock.sleep_until(fire_at).await;
                match this.fire(&ride_id).await {
                    FireOutcome::Failed(reason) => {
                        fire_at = this.clock.now().plus(FIRE_RETRY_DELAY);
                        this.armed().insert(ride_id.clone(), fire_at);
                        warn!(ride_id = %ride_id, %reason, retry_at = %fire_at, "timeout re-armed");
                    }
                    outcome => {
                        this.armed().remove(&ride_id);
                        return outcome;
                    }
                }
            }
        }))
    }

    /// Run the check-on-fire for `ride_id` now.
    pub async fn fire(&self, ride_id: &RideId) -> FireOutcome {
        let ride = match self.store.get_ride(ride_id).await {
            Ok(Some(ride)) => ride,
            Ok(None) => {
                warn!(ride_id = %ride_id, "timeout fired for unknown ride");
                return FireOutcome::NotFound;
            }
            Err(e) => {
                error!(ride_id = %ride_id, error = %e, "timeout could not load ride");
                return FireOutcome::Failed(e.to_string());
            }
        };

        if ride.status != RideStatus::Requested {
            debug!(ride_id = %ride_id, status = %ride.status, "timeout fired after ride resolved");
            return FireOutcome::AlreadyResolved(ride.status);
        }

        let cancelled = match state_machine::cancel(&ride) {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(ride_id = %ride_id, error = %e, "timeout cancellation rejected");
                return FireOutcome::AlreadyResolved(ride.status);
            }
        };

        match self
            .store
            .compare_and_set_ride(RideStatus::Requested, &cancelled)
            .await
        {
            Ok(true) => {
                info!(ride_id = %ride_id, "ride cancelled: no driver matched before deadline");
                self.events.publish_nowait(MatchEvent::RideCancelled {
                    ride_id: ride_id.clone(),
                });
                FireOutcome::Cancelled
            }
            Ok(false) => {
                debug!(ride_id = %ride_id, "timeout lost race, ride resolved concurrently");
                FireOutcome::Conflict
            }
            Err(e) => {
                error!(ride_id = %ride_id, error = %e, "timeout could not cancel ride");
                FireOutcome::Failed(e.to_string())
            }
        }
    }

    /// Re-arm every ride still in REQUESTED from its stored request time. Deadlines that
    /// already passed fire immediately.
    ///
    /// # Errors
    /// Returns an error if the REQUESTED listing fails. Individual ride lookups that fail are
    /// logged and skipped.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let ids = self.store.requested_ride_ids().await?;
        let mut armed = 0usize;
        for id in ids {
            match self.store.get_ride(&id).await {
                Ok(Some(ride)) if ride.status == RideStatus::Requested => {
                    if self.arm(ride.id, ride.requested_at).is_some() {
                        armed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(ride_id = %id, error = %e, "could not re-arm timeout"),
            }
        }
        info!(armed, "timeouts recovered");
        Ok(armed)
    }

    /// [`recover`](Self::recover) with exponential backoff while the store is unreachable.
    /// Corrupt records fail immediately.
    pub async fn recover_with_retry(&self, max_elapsed: Duration) -> Result<usize, StoreError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };
        retry(policy, || async {
            self.recover().await.map_err(|e| match e {
                StoreError::Corrupt { .. } => backoff::Error::permanent(e),
                _ => {
                    warn!(error = %e, "timeout recovery failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        })
        .await
    }

    /// Snapshot of pending deadlines, earliest first.
    pub fn pending(&self) -> Vec<ScheduledCancellation> {
        let mut pending: Vec<ScheduledCancellation> = self
            .armed()
            .iter()
            .map(|(ride_id, fire_at)| ScheduledCancellation {
                ride_id: ride_id.clone(),
                fire_at: *fire_at,
            })
            .collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.ride_id.cmp(&b.ride_id)));
        pending
    }

    pub fn armed_count(&self) -> usize {
        self.armed().len()
    }

    fn armed(&self) -> MutexGuard<'_, HashMap<RideId, TimeMs>> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for MatchTimeoutScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchTimeoutScheduler")
            .field("window", &self.window)
            .field("armed", &self.armed_count())
            .finish()
    }
}
