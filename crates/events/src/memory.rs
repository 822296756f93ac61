//! In-process event stream.
//!
//! Entries live in memory for the lifetime of the process. Used when the
//! worker runs without a database and throughout the pipeline tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetwatch_core::error::PipelineError;
use fleetwatch_core::types::{EventId, STREAM_START};
use fleetwatch_db::models::stream::StreamEntry;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::stream::EventStream;

#[derive(Default)]
struct Inner {
    last_id: EventId,
    streams: HashMap<String, Vec<StreamEntry>>,
}

/// Memory-backed [`EventStream`].
///
/// Ids come from one counter shared by all stream names, so they are
/// strictly increasing within each stream. Blocked readers are woken on
/// every append.
#[derive(Default)]
pub struct MemoryStream {
    inner: Mutex<Inner>,
    appended: Notify,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect(&self, stream: &str, after: EventId, count: usize) -> Vec<StreamEntry> {
        let inner = self.inner.lock().await;
        let Some(entries) = inner.streams.get(stream) else {
            return Vec::new();
        };

        // Entries are sorted by id; skip straight past the cursor.
        let start = entries.partition_point(|e| e.id <= after);
        entries[start..].iter().take(count).cloned().collect()
    }
}

#[async_trait]
impl EventStream for MemoryStream {
    async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
    ) -> Result<EventId, PipelineError> {
        let id = {
            let mut inner = self.inner.lock().await;
            inner.last_id += 1;
            let id = inner.last_id;
            inner
                .streams
                .entry(stream.to_string())
                .or_default()
                .push(StreamEntry {
                    id,
                    stream_name: stream.to_string(),
                    payload: payload.clone(),
                    created_at: Utc::now(),
                });
            id
        };

        self.appended.notify_waiters();
        tracing::trace!(stream, event_id = id, "Appended stream entry");
        Ok(id)
    }

    async fn read(
        &self,
        stream: &str,
        after: EventId,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, PipelineError> {
        let after = after.max(STREAM_START);
        let deadline = Instant::now() + block;

        loop {
            // Register for wake-ups before looking, so an append landing
            // between the check and the wait is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entries = self.collect(stream, after, count).await;
            if !entries.is_empty() || block.is_zero() {
                return Ok(entries);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }
}
