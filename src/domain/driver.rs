//! Driver availability record.

use crate::domain::{DriverId, Location};
use serde::{Deserialize, Serialize};

/// A driver as seen by the matching core: identity, availability and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: DriverId,
    pub available: bool,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

impl Driver {
    pub fn available(id: DriverId, location: Location) -> Self {
        Driver {
            id,
            available: true,
            location,
            vehicle_id: None,
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }
}
