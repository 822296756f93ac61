//! Follow-up ticket entity model and DTOs.

use fleetwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::status::{StatusId, TicketStatus};

/// A row from the `tickets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ticket {
    pub id: DbId,
    pub device_id: DbId,
    /// The alert that spawned this ticket (1:1).
    pub alert_id: DbId,
    pub description: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticket {
    pub fn status(&self) -> Option<TicketStatus> {
        TicketStatus::from_id(self.status_id)
    }
}

/// DTO for opening a ticket. Tickets always start `OPEN`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicket {
    pub device_id: DbId,
    pub alert_id: DbId,
    pub description: String,
}
