//! Consumer cursor model.

use fleetwatch_core::types::{EventId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `consumer_cursors` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConsumerCursor {
    pub consumer_name: String,
    pub stream_name: String,
    /// Last stream event this consumer fully processed (`0` = none yet).
    pub last_event_id: EventId,
    pub updated_at: Timestamp,
}
