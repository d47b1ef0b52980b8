use crate::domain::RideRequested;
use crate::orchestration::scheduler::{FireOutcome, MatchTimeoutScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Routes intake messages to the timeout scheduler. Holds no state of its own.
#[derive(Debug, Clone)]
pub struct MatchingCoordinator {
    scheduler: MatchTimeoutScheduler,
}

impl MatchingCoordinator {
    pub fn new(scheduler: MatchTimeoutScheduler) -> Self {
        Self { scheduler }
    }

    pub fn on_ride_requested(&self, event: RideRequested) -> Option<JoinHandle<FireOutcome>> {
        debug!(ride_id = %event.ride_id, requested_at = %event.requested_at, "ride requested");
        self.scheduler.arm(event.ride_id, event.requested_at)
    }

    /// Drain `inbound` until every sender is dropped.
    pub async fn run(self, mut inbound: mpsc::Receiver<RideRequested>) {
        info!("matching coordinator started");
        while let Some(event) = inbound.recv().await {
            self.on_ride_requested(event);
        }
        info!("matching coordinator stopped: intake closed");
    }
}
