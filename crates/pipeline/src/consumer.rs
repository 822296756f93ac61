//! Cursor-driven alert consumer.
//!
//! [`AlertConsumer`] is the handling half of the pipeline. It reads
//! alert-raised events after its cursor, turns each one into exactly one
//! alert and one open ticket, and advances the cursor only past events that
//! are fully handled.
//!
//! Failure policy per event:
//!
//! | Outcome                       | Counted as       | Cursor            |
//! |-------------------------------|------------------|-------------------|
//! | Alert and ticket written      | `created`        | advances          |
//! | Alert and ticket already there | `duplicates`    | advances          |
//! | Alert there, ticket missing   | `repaired`       | advances          |
//! | `PermanentPayload`            | `poison_skipped` | advances          |
//! | `TransientStore` / other      | `failed`         | stops (retried)   |
//!
//! Once an event fails, later events in the same batch are still attempted
//! but the cursor stays on the last event before the failure, so the next
//! read starts again at the failed event.

use std::sync::Arc;
use std::time::Duration;

use fleetwatch_core::alert::AlertRaised;
use fleetwatch_core::error::PipelineError;
use fleetwatch_core::types::{EventId, STREAM_START};
use fleetwatch_db::models::alert::CreateAlert;
use fleetwatch_events::stream::{ALERT_STREAM, DEFAULT_READ_COUNT};
use fleetwatch_events::{EventStream, StreamEntry};
use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, RetryConfig};
use crate::store::{ticket_for, Store};

/// Default cursor key.
pub const DEFAULT_CONSUMER_NAME: &str = "alert_worker";

/// Default blocking read timeout.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Key under which the cursor is persisted.
    pub consumer_name: String,
    pub stream: String,
    /// How long one read waits for new events.
    pub block_timeout: Duration,
    /// Maximum events per read.
    pub batch_size: usize,
    /// Back-off after a failed read or a batch with failures.
    pub retry: RetryConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            stream: ALERT_STREAM.to_string(),
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            batch_size: DEFAULT_READ_COUNT,
            retry: RetryConfig::default(),
        }
    }
}

/// Counts from one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: usize,
    pub duplicates: usize,
    pub repaired: usize,
    pub poison_skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

enum Outcome {
    Created,
    Duplicate,
    Repaired,
}

// ---------------------------------------------------------------------------
// AlertConsumer
// ---------------------------------------------------------------------------

pub struct AlertConsumer {
    store: Arc<dyn Store>,
    stream: Arc<dyn EventStream>,
    config: ConsumerConfig,
    cursor: EventId,
}

impl AlertConsumer {
    /// The cursor starts at the beginning of the stream until
    /// [`load_cursor`](Self::load_cursor) runs.
    pub fn new(store: Arc<dyn Store>, stream: Arc<dyn EventStream>, config: ConsumerConfig) -> Self {
        Self {
            store,
            stream,
            config,
            cursor: STREAM_START,
        }
    }

    /// Id of the last event fully handled.
    pub fn cursor(&self) -> EventId {
        self.cursor
    }

    /// Restore the persisted cursor. A consumer with no saved cursor starts
    /// at the beginning of the stream.
    pub async fn load_cursor(&mut self) -> Result<EventId, PipelineError> {
        self.cursor = self
            .store
            .load_cursor(&self.config.consumer_name)
            .await?
            .unwrap_or(STREAM_START);
        Ok(self.cursor)
    }

    /// Open the missing ticket for every alert that has none.
    ///
    /// Returns the number of tickets created. A ticket that cannot be
    /// written is logged and left for the next delivery of its event.
    pub async fn repair_orphans(&self) -> Result<usize, PipelineError> {
        let orphans = self.store.list_alerts_without_ticket().await?;
        let mut repaired = 0;

        for alert in &orphans {
            match self.store.create_ticket(&ticket_for(alert)).await {
                Ok(ticket) => {
                    repaired += 1;
                    tracing::info!(
                        alert_id = alert.id,
                        ticket_id = ticket.id,
                        source_event_id = alert.source_event_id,
                        "Repaired alert without ticket"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        alert_id = alert.id,
                        error = %e,
                        "Failed to repair alert without ticket"
                    );
                }
            }
        }

        Ok(repaired)
    }

    /// Read one batch after the cursor and process it.
    ///
    /// An empty batch (read timed out) yields an empty report.
    pub async fn poll(&mut self) -> Result<BatchReport, PipelineError> {
        let entries = self
            .stream
            .read(
                &self.config.stream,
                self.cursor,
                self.config.block_timeout,
                self.config.batch_size,
            )
            .await?;
        Ok(self.process_batch(&entries).await)
    }

    /// Handle entries in order, advancing the cursor as far as the first
    /// retryable failure.
    pub async fn process_batch(&mut self, entries: &[StreamEntry]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut blocked = false;

        for entry in entries {
            match self.process_entry(entry).await {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Created => report.created += 1,
                        Outcome::Duplicate => report.duplicates += 1,
                        Outcome::Repaired => report.repaired += 1,
                    }
                    if !blocked {
                        self.advance(entry.id).await;
                    }
                }
                Err(e) if !e.is_transient() => {
                    report.poison_skipped += 1;
                    tracing::warn!(
                        event_id = entry.id,
                        error = %e,
                        "Skipping event that can never be stored"
                    );
                    if !blocked {
                        self.advance(entry.id).await;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    blocked = true;
                    tracing::error!(
                        event_id = entry.id,
                        cursor = self.cursor,
                        error = %e,
                        "Failed to process event, will retry"
                    );
                }
            }
        }

        if !entries.is_empty() {
            tracing::debug!(
                received = entries.len(),
                created = report.created,
                duplicates = report.duplicates,
                repaired = report.repaired,
                poison_skipped = report.poison_skipped,
                failed = report.failed,
                cursor = self.cursor,
                "Batch processed"
            );
        }

        report
    }

    async fn process_entry(&self, entry: &StreamEntry) -> Result<Outcome, PipelineError> {
        if let Some(alert) = self.store.find_alert_by_source_event(entry.id).await? {
            if self.store.find_ticket_by_alert(alert.id).await?.is_some() {
                tracing::debug!(event_id = entry.id, alert_id = alert.id, "Event already handled");
                return Ok(Outcome::Duplicate);
            }

            let ticket = self.store.create_ticket(&ticket_for(&alert)).await?;
            tracing::info!(
                event_id = entry.id,
                alert_id = alert.id,
                ticket_id = ticket.id,
                "Created missing ticket for existing alert"
            );
            return Ok(Outcome::Repaired);
        }

        let event = AlertRaised::from_payload(&entry.payload)?;
        let input = CreateAlert {
            device_id: event.device_id,
            message: event.message,
            severity: event.severity.as_str().to_string(),
            source_event_id: entry.id,
        };
        let (alert, ticket) = self.store.create_alert_with_ticket(&input).await?;

        tracing::info!(
            event_id = entry.id,
            device_id = alert.device_id,
            alert_id = alert.id,
            ticket_id = ticket.id,
            "Alert and ticket created"
        );
        Ok(Outcome::Created)
    }

    /// Move the cursor and persist it. A failed save is logged; the
    /// in-memory cursor still moves and the next save catches up.
    async fn advance(&mut self, event_id: EventId) {
        self.cursor = event_id;
        if let Err(e) = self
            .store
            .save_cursor(&self.config.consumer_name, &self.config.stream, event_id)
            .await
        {
            tracing::warn!(event_id, error = %e, "Failed to persist consumer cursor");
        }
    }

    /// Consume until `cancel` fires.
    ///
    /// Startup restores the cursor (retrying until the store answers) and
    /// runs the orphan repair scan. Cancellation interrupts a blocked read
    /// or a back-off sleep, never a batch in progress.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.retry.clone());

        let cursor = loop {
            match self.load_cursor().await {
                Ok(cursor) => break cursor,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load consumer cursor");
                    if !backoff.wait(&cancel).await {
                        return;
                    }
                }
            }
        };
        backoff.reset();
        tracing::info!(
            consumer = %self.config.consumer_name,
            stream = %self.config.stream,
            cursor,
            "Alert consumer started"
        );

        if let Err(e) = self.repair_orphans().await {
            tracing::warn!(error = %e, "Orphan repair scan failed");
        }

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.stream.read(
                    &self.config.stream,
                    self.cursor,
                    self.config.block_timeout,
                    self.config.batch_size,
                ) => read,
            };

            let retry = match read {
                Ok(entries) => self.process_batch(&entries).await.has_failures(),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        failures = backoff.failures() + 1,
                        "Stream read failed"
                    );
                    true
                }
            };

            if retry {
                if !backoff.wait(&cancel).await {
                    break;
                }
            } else {
                backoff.reset();
            }
        }

        tracing::info!(cursor = self.cursor, "Alert consumer stopping");
    }
}
