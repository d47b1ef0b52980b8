//! Domain types for ride matching.
//!
//! This module provides:
//! - Identifiers and time: RideId, DriverId, PassengerId, TimeMs
//! - Money via the Decimal wrapper
//! - Ride, Driver and Location records
//! - Messages exchanged with the matching core

pub mod decimal;
pub mod driver;
pub mod events;
pub mod location;
pub mod primitives;
pub mod ride;

pub use decimal::Decimal;
pub use driver::Driver;
pub use events::{MatchEvent, RideRequested};
pub use location::{Location, LocationError};
pub use primitives::{DriverId, PassengerId, RideId, TimeMs};
pub use ride::{Ride, RideStatus, RideTier, UnknownVariant};
