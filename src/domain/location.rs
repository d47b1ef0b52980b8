//! Geographic location value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point on the globe with an optional human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Degrees, in [-90, 90].
    pub latitude: f64,
    /// Degrees, in [-180, 180].
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum LocationError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
}

impl Location {
    /// Create a validated location.
    ///
    /// # Errors
    /// Returns an error if either coordinate is out of range or not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        let location = Location {
            latitude,
            longitude,
            address: None,
        };
        location.validate()?;
        Ok(location)
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Check coordinate bounds. Deserialized values skip [`Location::new`], so the API
    /// calls this explicitly.
    pub fn validate(&self) -> Result<(), LocationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(LocationError::Latitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(LocationError::Longitude(self.longitude));
        }
        Ok(())
    }
}
