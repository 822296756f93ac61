//! The event stream contract.

use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_core::error::PipelineError;
use fleetwatch_core::types::EventId;
use fleetwatch_db::models::stream::StreamEntry;

/// Default name of the stream carrying alert-raised events.
pub const ALERT_STREAM: &str = "alert_stream";

/// Default maximum number of entries returned by a single read.
pub const DEFAULT_READ_COUNT: usize = 100;

/// An append-only, totally ordered log of events per stream name.
///
/// Ids are assigned by the stream and are strictly greater than every id
/// issued before them. Readers see entries in append order. The stream keeps
/// no per-reader state: positions (cursors) belong to the consumer.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Append a payload and return its id. The entry is persisted before
    /// this returns.
    async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
    ) -> Result<EventId, PipelineError>;

    /// Return up to `count` entries with an id greater than `after`, in
    /// append order.
    ///
    /// When nothing is available yet, waits up to `block` for an append.
    /// A timeout yields an empty vector, not an error.
    async fn read(
        &self,
        stream: &str,
        after: EventId,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, PipelineError>;
}
