pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Driver, DriverId, Location, MatchEvent, PassengerId, Ride, RideId, RideRequested,
    RideStatus, RideTier, TimeMs,
};
pub use error::AppError;
pub use store::{InMemoryStore, RideStore, StoreError};
