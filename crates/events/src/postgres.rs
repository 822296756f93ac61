//! Durable event stream over the `stream_entries` table.
//!
//! Appends are plain inserts; an `AFTER INSERT` trigger issues
//! `pg_notify('stream_entries', <stream name>)`. A blocked reader holds a
//! [`PgListener`] on that channel and re-queries on each notification.
//!
//! Ids come from a BIGSERIAL, so they are only guaranteed to commit in order
//! while there is a single appender. The health monitor is that single
//! appender.

use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_core::error::PipelineError;
use fleetwatch_core::types::{EventId, STREAM_START};
use fleetwatch_db::models::stream::StreamEntry;
use fleetwatch_db::repositories::StreamRepo;
use fleetwatch_db::DbPool;
use sqlx::postgres::PgListener;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::stream::EventStream;

/// Notification channel written by the `trg_stream_entries_notify` trigger.
const NOTIFY_CHANNEL: &str = "stream_entries";

/// Postgres-backed [`EventStream`].
pub struct PgEventStream {
    pool: DbPool,
    /// Lazily connected listener, shared by reads on this instance.
    listener: Mutex<Option<PgListener>>,
}

impl PgEventStream {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            listener: Mutex::new(None),
        }
    }

    async fn fetch(
        &self,
        stream: &str,
        after: EventId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, PipelineError> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        StreamRepo::list_after(&self.pool, stream, after.max(STREAM_START), limit)
            .await
            .map_err(PipelineError::stream)
    }

    async fn connect_listener(pool: &DbPool) -> Result<PgListener, PipelineError> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(PipelineError::stream)?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(PipelineError::stream)?;
        tracing::debug!(channel = NOTIFY_CHANNEL, "Stream listener connected");
        Ok(listener)
    }

    async fn wait_for_entries(
        &self,
        listener: &mut PgListener,
        stream: &str,
        after: EventId,
        count: usize,
        deadline: Instant,
    ) -> Result<Vec<StreamEntry>, PipelineError> {
        loop {
            // Query again now that we are listening: an append may have
            // committed between the first query and LISTEN.
            let entries = self.fetch(stream, after, count).await?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            match tokio::time::timeout_at(deadline, listener.recv()).await {
                Err(_) => return Ok(Vec::new()),
                Ok(Ok(notification)) if notification.payload() != stream => {
                    tracing::trace!(
                        stream = notification.payload(),
                        "Ignoring notification for another stream"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(PipelineError::stream(e)),
            }
        }
    }
}

#[async_trait]
impl EventStream for PgEventStream {
    async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
    ) -> Result<EventId, PipelineError> {
        let entry = StreamRepo::append(&self.pool, stream, payload)
            .await
            .map_err(PipelineError::stream)?;
        tracing::trace!(stream, event_id = entry.id, "Appended stream entry");
        Ok(entry.id)
    }

    async fn read(
        &self,
        stream: &str,
        after: EventId,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, PipelineError> {
        let entries = self.fetch(stream, after, count).await?;
        if !entries.is_empty() || block.is_zero() {
            return Ok(entries);
        }

        let deadline = Instant::now() + block;
        let mut guard = self.listener.lock().await;
        let mut listener = match guard.take() {
            Some(listener) => listener,
            None => Self::connect_listener(&self.pool).await?,
        };

        // A listener that failed is dropped and reconnected on the next read.
        let entries = self
            .wait_for_entries(&mut listener, stream, after, count, deadline)
            .await?;
        *guard = Some(listener);
        Ok(entries)
    }
}
