//! SQLite persistence.
//!
//! This module provides:
//! - Database initialization with connection pragmas and schema
//! - `Repository`, the SQLite-backed `RideStore`

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
