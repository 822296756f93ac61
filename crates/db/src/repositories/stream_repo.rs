//! Repository for the append-only `stream_entries` table.

use fleetwatch_core::types::EventId;
use sqlx::PgPool;

use crate::models::stream::StreamEntry;

/// Column list for `stream_entries` queries.
const COLUMNS: &str = "id, stream_name, payload, created_at";

/// Append and range-read operations on named streams.
///
/// Entries are never updated or deleted.
pub struct StreamRepo;

impl StreamRepo {
    /// Append a payload to a stream, returning the stored entry.
    pub async fn append(
        pool: &PgPool,
        stream_name: &str,
        payload: &serde_json::Value,
    ) -> Result<StreamEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO stream_entries (stream_name, payload) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StreamEntry>(&query)
            .bind(stream_name)
            .bind(payload)
            .fetch_one(pool)
            .await
    }

    /// List up to `limit` entries with an id strictly greater than `after`,
    /// in append order.
    pub async fn list_after(
        pool: &PgPool,
        stream_name: &str,
        after: EventId,
        limit: i64,
    ) -> Result<Vec<StreamEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stream_entries \
             WHERE stream_name = $1 AND id > $2 \
             ORDER BY id \
             LIMIT $3"
        );
        sqlx::query_as::<_, StreamEntry>(&query)
            .bind(stream_name)
            .bind(after)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
