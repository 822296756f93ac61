//! Repository for the `consumer_cursors` table.

use fleetwatch_core::types::EventId;
use sqlx::PgPool;

use crate::models::cursor::ConsumerCursor;

/// Column list for `consumer_cursors` queries.
const COLUMNS: &str = "consumer_name, stream_name, last_event_id, updated_at";

/// Durable per-consumer stream positions.
pub struct CursorRepo;

impl CursorRepo {
    /// Load a consumer's cursor, or `None` on first run.
    pub async fn find(
        pool: &PgPool,
        consumer_name: &str,
    ) -> Result<Option<ConsumerCursor>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM consumer_cursors WHERE consumer_name = $1");
        sqlx::query_as::<_, ConsumerCursor>(&query)
            .bind(consumer_name)
            .fetch_optional(pool)
            .await
    }

    /// Record the last fully processed event for a consumer.
    pub async fn upsert(
        pool: &PgPool,
        consumer_name: &str,
        stream_name: &str,
        last_event_id: EventId,
    ) -> Result<ConsumerCursor, sqlx::Error> {
        let query = format!(
            "INSERT INTO consumer_cursors (consumer_name, stream_name, last_event_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (consumer_name) DO UPDATE \
                SET stream_name = EXCLUDED.stream_name, \
                    last_event_id = EXCLUDED.last_event_id, \
                    updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ConsumerCursor>(&query)
            .bind(consumer_name)
            .bind(stream_name)
            .bind(last_event_id)
            .fetch_one(pool)
            .await
    }
}
