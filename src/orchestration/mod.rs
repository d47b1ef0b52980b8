//! Async matching core: intake routing, deadline cancellation and the availability poller.

pub mod clock;
pub mod coordinator;
pub mod events;
pub mod poller;
pub mod rides;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::MatchingCoordinator;
pub use events::{EventError, EventProducer};
pub use poller::{DriverAvailabilityPoller, MatchError, PollerSettings, TickReport};
pub use rides::{NewRide, RideError, RideService};
pub use scheduler::{
    FireOutcome, MatchTimeoutScheduler, ScheduledCancellation, FIRE_RETRY_DELAY,
};
