use crate::domain::{Driver, Location};
use crate::engine::geo::distance_km;

/// A driver ranked for a pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub driver: Driver,
    pub pickup_distance_km: f64,
}

/// Rank available drivers nearest-first by distance to `pickup`, ties broken by lowest id.
///
/// Drivers flagged unavailable are ignored.
pub fn rank_candidates(pickup: &Location, drivers: &[Driver]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = drivers
        .iter()
        .filter(|d| d.available)
        .map(|d| Candidate {
            pickup_distance_km: distance_km(&d.location, pickup),
            driver: d.clone(),
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.pickup_distance_km
            .total_cmp(&b.pickup_distance_km)
            .then_with(|| a.driver.id.cmp(&b.driver.id))
    });
    candidates
}
