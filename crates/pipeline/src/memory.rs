//! In-process [`Store`] implementation.
//!
//! Mirrors the constraints the Postgres schema enforces (unknown device or
//! alert references, message length, one alert per source event, one ticket
//! per alert) so that pipeline behaviour is the same against either
//! backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use fleetwatch_core::device::{
    validate_device_name, validate_device_type, MAX_ALERT_MESSAGE_LEN,
};
use fleetwatch_core::error::{CoreError, PipelineError};
use fleetwatch_core::types::{DbId, EventId};
use fleetwatch_db::models::alert::{Alert, CreateAlert};
use fleetwatch_db::models::device::{CreateDevice, Device};
use fleetwatch_db::models::status::{DeviceStatus, TicketStatus};
use fleetwatch_db::models::ticket::{CreateTicket, Ticket};
use tokio::sync::Mutex;

use crate::store::{ticket_for, Store};

#[derive(Default)]
struct State {
    next_id: DbId,
    devices: BTreeMap<DbId, Device>,
    alerts: BTreeMap<DbId, Alert>,
    tickets: BTreeMap<DbId, Ticket>,
    cursors: HashMap<String, EventId>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn insert_alert(&mut self, input: &CreateAlert) -> Result<Alert, PipelineError> {
        if !self.devices.contains_key(&input.device_id) {
            return Err(PipelineError::payload(format!(
                "alert references unknown device {}",
                input.device_id
            )));
        }
        if input.message.chars().count() > MAX_ALERT_MESSAGE_LEN {
            return Err(PipelineError::payload(format!(
                "alert message exceeds {MAX_ALERT_MESSAGE_LEN} characters"
            )));
        }
        if self
            .alerts
            .values()
            .any(|a| a.source_event_id == input.source_event_id)
        {
            return Err(PipelineError::store(format!(
                "an alert already references source event {}",
                input.source_event_id
            )));
        }

        let alert = Alert {
            id: self.next_id(),
            device_id: input.device_id,
            message: input.message.clone(),
            severity: input.severity.clone(),
            source_event_id: input.source_event_id,
            created_at: Utc::now(),
        };
        self.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    fn insert_ticket(&mut self, input: &CreateTicket) -> Result<Ticket, PipelineError> {
        if !self.alerts.contains_key(&input.alert_id) {
            return Err(PipelineError::payload(format!(
                "ticket references unknown alert {}",
                input.alert_id
            )));
        }
        if self.tickets.values().any(|t| t.alert_id == input.alert_id) {
            return Err(PipelineError::store(format!(
                "alert {} already has a ticket",
                input.alert_id
            )));
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: self.next_id(),
            device_id: input.device_id,
            alert_id: input.alert_id,
            description: input.description.clone(),
            status_id: TicketStatus::Open.id(),
            created_at: now,
            updated_at: now,
        };
        self.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }
}

/// Memory-backed [`Store`]. Data lives as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_device(&self, input: &CreateDevice) -> Result<Device, CoreError> {
        validate_device_name(&input.name)?;
        validate_device_type(&input.device_type)?;

        let mut state = self.state.lock().await;
        let now = Utc::now();
        let device = Device {
            id: state.next_id(),
            name: input.name.clone(),
            device_type: input.device_type.clone(),
            status_id: DeviceStatus::Up.id(),
            created_at: now,
            updated_at: now,
        };
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_all_devices(&self) -> Result<Vec<Device>, PipelineError> {
        Ok(self.state.lock().await.devices.values().cloned().collect())
    }

    async fn update_device_status(
        &self,
        id: DbId,
        status: DeviceStatus,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        // Mirrors an UPDATE that matches no rows.
        if let Some(device) = state.devices.get_mut(&id) {
            device.status_id = status.id();
            device.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_alert(&self, input: &CreateAlert) -> Result<Alert, PipelineError> {
        self.state.lock().await.insert_alert(input)
    }

    async fn find_alert_by_source_event(
        &self,
        event_id: EventId,
    ) -> Result<Option<Alert>, PipelineError> {
        Ok(self
            .state
            .lock()
            .await
            .alerts
            .values()
            .find(|a| a.source_event_id == event_id)
            .cloned())
    }

    async fn list_alerts_without_ticket(&self) -> Result<Vec<Alert>, PipelineError> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .values()
            .filter(|a| !state.tickets.values().any(|t| t.alert_id == a.id))
            .cloned()
            .collect())
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, PipelineError> {
        Ok(self.state.lock().await.alerts.values().cloned().collect())
    }

    async fn create_ticket(&self, input: &CreateTicket) -> Result<Ticket, PipelineError> {
        self.state.lock().await.insert_ticket(input)
    }

    async fn find_ticket_by_alert(&self, alert_id: DbId) -> Result<Option<Ticket>, PipelineError> {
        Ok(self
            .state
            .lock()
            .await
            .tickets
            .values()
            .find(|t| t.alert_id == alert_id)
            .cloned())
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, PipelineError> {
        Ok(self.state.lock().await.tickets.values().cloned().collect())
    }

    async fn update_ticket_status(
        &self,
        id: DbId,
        status: TicketStatus,
    ) -> Result<Ticket, CoreError> {
        let mut state = self.state.lock().await;
        let ticket = state
            .tickets
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "ticket", id })?;
        ticket.status_id = status.id();
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    /// Both writes happen under one lock: either both land or neither does.
    async fn create_alert_with_ticket(
        &self,
        input: &CreateAlert,
    ) -> Result<(Alert, Ticket), PipelineError> {
        let mut state = self.state.lock().await;
        let alert = state.insert_alert(input)?;
        match state.insert_ticket(&ticket_for(&alert)) {
            Ok(ticket) => Ok((alert, ticket)),
            Err(e) => {
                state.alerts.remove(&alert.id);
                Err(e)
            }
        }
    }

    async fn load_cursor(&self, consumer: &str) -> Result<Option<EventId>, PipelineError> {
        Ok(self.state.lock().await.cursors.get(consumer).copied())
    }

    async fn save_cursor(
        &self,
        consumer: &str,
        _stream: &str,
        event_id: EventId,
    ) -> Result<(), PipelineError> {
        self.state
            .lock()
            .await
            .cursors
            .insert(consumer.to_string(), event_id);
        Ok(())
    }
}
