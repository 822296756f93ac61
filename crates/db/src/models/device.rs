//! Monitored device entity model and DTOs.

use fleetwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::status::{DeviceStatus, StatusId};

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DbId,
    pub name: String,
    pub device_type: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Device {
    /// Decoded health status. Unknown ids (a lookup row added without a
    /// matching enum variant) read as `None`.
    pub fn status(&self) -> Option<DeviceStatus> {
        DeviceStatus::from_id(self.status_id)
    }
}

/// DTO for registering a new device. New devices start `UP`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDevice {
    pub name: String,
    pub device_type: String,
}
