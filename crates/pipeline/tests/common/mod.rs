//! Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_core::error::{CoreError, PipelineError};
use fleetwatch_core::types::{DbId, EventId};
use fleetwatch_db::models::alert::{Alert, CreateAlert};
use fleetwatch_db::models::device::{CreateDevice, Device};
use fleetwatch_db::models::status::{DeviceStatus, TicketStatus};
use fleetwatch_db::models::ticket::{CreateTicket, Ticket};
use fleetwatch_events::{EventStream, MemoryStream, StreamEntry};
use fleetwatch_pipeline::backoff::RetryConfig;
use fleetwatch_pipeline::{ConsumerConfig, HealthProbe, MemoryStore, MonitorConfig, Store};

pub const STREAM: &str = "alert_stream";

pub fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_millis(20),
        stream: STREAM.to_string(),
    }
}

pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        consumer_name: "test_worker".to_string(),
        stream: STREAM.to_string(),
        block_timeout: Duration::from_millis(50),
        batch_size: 100,
        retry: RetryConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        },
    }
}

pub async fn register(store: &dyn Store, name: &str) -> Device {
    store
        .create_device(&CreateDevice {
            name: name.to_string(),
            device_type: "router".to_string(),
        })
        .await
        .unwrap()
}

pub async fn status_of(store: &dyn Store, id: DbId) -> Option<DeviceStatus> {
    store
        .get_all_devices()
        .await
        .unwrap()
        .into_iter()
        .find(|d| d.id == id)
        .and_then(|d| d.status())
}

/// Append the event the monitor would emit for `device`.
pub async fn append_down(stream: &dyn EventStream, device: &Device) -> EventId {
    let event = fleetwatch_core::alert::AlertRaised::device_down(device.id, &device.name);
    stream.append(STREAM, &event.to_payload()).await.unwrap()
}

pub async fn read_all(stream: &dyn EventStream) -> Vec<StreamEntry> {
    stream.read(STREAM, 0, Duration::ZERO, 1000).await.unwrap()
}

// ---------------------------------------------------------------------------
// ScriptedProbe
// ---------------------------------------------------------------------------

/// Health probe that replays a per-device script of statuses.
///
/// Devices without a script (or whose script ran out) keep their current
/// status. Devices listed in `failing` make `evaluate` fail.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<DbId, VecDeque<DeviceStatus>>>,
    failing: Mutex<Vec<DbId>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, device_id: DbId, statuses: &[DeviceStatus]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(device_id)
            .or_default()
            .extend(statuses.iter().copied());
    }

    pub fn fail_for(&self, device_id: DbId) {
        self.failing.lock().unwrap().push(device_id);
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn evaluate(&self, device: &Device) -> Result<DeviceStatus, PipelineError> {
        if self.failing.lock().unwrap().contains(&device.id) {
            return Err(PipelineError::store(format!("probe for device {} timed out", device.id)));
        }
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&device.id)
            .and_then(VecDeque::pop_front);
        Ok(next
            .or_else(|| device.status())
            .unwrap_or(DeviceStatus::Up))
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// [`MemoryStore`] wrapper that injects transient write failures.
///
/// It keeps the non-atomic default `create_alert_with_ticket`, so a ticket
/// failure leaves the alert behind the way a crash between two commits
/// would.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_tickets: AtomicBool,
    fail_alerts_for: Mutex<Option<DbId>>,
    fail_status_updates_for: Mutex<Option<DbId>>,
    fail_cursor_loads: AtomicUsize,
    fail_cursor_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_tickets(&self, fail: bool) {
        self.fail_tickets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_alerts_for(&self, device_id: Option<DbId>) {
        *self.fail_alerts_for.lock().unwrap() = device_id;
    }

    pub fn fail_status_updates_for(&self, device_id: Option<DbId>) {
        *self.fail_status_updates_for.lock().unwrap() = device_id;
    }

    pub fn fail_cursor_saves(&self, fail: bool) {
        self.fail_cursor_saves.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` cursor loads fail.
    pub fn fail_cursor_loads(&self, n: usize) {
        self.fail_cursor_loads.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_device(&self, input: &CreateDevice) -> Result<Device, CoreError> {
        self.inner.create_device(input).await
    }

    async fn get_all_devices(&self) -> Result<Vec<Device>, PipelineError> {
        self.inner.get_all_devices().await
    }

    async fn update_device_status(
        &self,
        id: DbId,
        status: DeviceStatus,
    ) -> Result<(), PipelineError> {
        if *self.fail_status_updates_for.lock().unwrap() == Some(id) {
            return Err(PipelineError::store("deadlock detected updating device"));
        }
        self.inner.update_device_status(id, status).await
    }

    async fn create_alert(&self, input: &CreateAlert) -> Result<Alert, PipelineError> {
        if *self.fail_alerts_for.lock().unwrap() == Some(input.device_id) {
            return Err(PipelineError::store("lock timeout writing alert"));
        }
        self.inner.create_alert(input).await
    }

    async fn find_alert_by_source_event(
        &self,
        event_id: EventId,
    ) -> Result<Option<Alert>, PipelineError> {
        self.inner.find_alert_by_source_event(event_id).await
    }

    async fn list_alerts_without_ticket(&self) -> Result<Vec<Alert>, PipelineError> {
        self.inner.list_alerts_without_ticket().await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, PipelineError> {
        self.inner.list_alerts().await
    }

    async fn create_ticket(&self, input: &CreateTicket) -> Result<Ticket, PipelineError> {
        if self.fail_tickets.load(Ordering::SeqCst) {
            return Err(PipelineError::store("connection reset writing ticket"));
        }
        self.inner.create_ticket(input).await
    }

    async fn find_ticket_by_alert(&self, alert_id: DbId) -> Result<Option<Ticket>, PipelineError> {
        self.inner.find_ticket_by_alert(alert_id).await
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, PipelineError> {
        self.inner.list_tickets().await
    }

    async fn update_ticket_status(
        &self,
        id: DbId,
        status: TicketStatus,
    ) -> Result<Ticket, CoreError> {
        self.inner.update_ticket_status(id, status).await
    }

    async fn load_cursor(&self, consumer: &str) -> Result<Option<EventId>, PipelineError> {
        let remaining = self.fail_cursor_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_cursor_loads.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::store("database starting up"));
        }
        self.inner.load_cursor(consumer).await
    }

    async fn save_cursor(
        &self,
        consumer: &str,
        stream: &str,
        event_id: EventId,
    ) -> Result<(), PipelineError> {
        if self.fail_cursor_saves.load(Ordering::SeqCst) {
            return Err(PipelineError::store("connection reset saving cursor"));
        }
        self.inner.save_cursor(consumer, stream, event_id).await
    }
}

// ---------------------------------------------------------------------------
// FlakyStream
// ---------------------------------------------------------------------------

/// [`MemoryStream`] wrapper whose appends and reads can be made to fail.
#[derive(Default)]
pub struct FlakyStream {
    pub inner: MemoryStream,
    fail_appends: AtomicBool,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
}

impl FlakyStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `read` calls so far, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStream for FlakyStream {
    async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
    ) -> Result<EventId, PipelineError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(PipelineError::stream("stream unreachable"));
        }
        self.inner.append(stream, payload).await
    }

    async fn read(
        &self,
        stream: &str,
        after: EventId,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PipelineError::stream("stream unreachable"));
        }
        self.inner.read(stream, after, block, count).await
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check().await
}
