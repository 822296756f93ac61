//! Alert entity model and DTOs.

use fleetwatch_core::types::{DbId, EventId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `alerts` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: DbId,
    pub device_id: DbId,
    pub message: String,
    pub severity: String,
    /// Stream event this alert was created from. Unique across alerts.
    pub source_event_id: EventId,
    pub created_at: Timestamp,
}

/// DTO for inserting a new alert.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlert {
    pub device_id: DbId,
    pub message: String,
    pub severity: String,
    pub source_event_id: EventId,
}
