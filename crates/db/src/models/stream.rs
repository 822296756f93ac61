//! Append-only stream entry model.

use fleetwatch_core::types::{EventId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `stream_entries` table.
///
/// The payload is kept as raw JSON: a reader decides how to interpret it,
/// and a malformed payload must still be readable so it can be skipped.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct StreamEntry {
    pub id: EventId,
    pub stream_name: String,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
