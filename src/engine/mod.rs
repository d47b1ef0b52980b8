//! Pure computation for matching: distance, pricing, status transitions, candidate ranking.

pub mod fare;
pub mod geo;
pub mod selection;
pub mod state_machine;

pub use fare::{demand_multiplier, estimate_duration_min, FareError, FareSchedule};
pub use geo::distance_km;
pub use selection::{rank_candidates, Candidate};
pub use state_machine::{transition, InvalidTransition};
