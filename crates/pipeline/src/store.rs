//! Persistence boundary shared by the health monitor, the alert consumer and
//! the (external) CRUD surface.
//!
//! Pipeline operations report [`PipelineError`] so the loops can tell a
//! retryable store failure from a payload that can never be stored.
//! Registration-style operations used by operators report [`CoreError`].

use async_trait::async_trait;
use fleetwatch_core::error::{CoreError, PipelineError};
use fleetwatch_core::types::{DbId, EventId};
use fleetwatch_db::models::alert::{Alert, CreateAlert};
use fleetwatch_db::models::device::{CreateDevice, Device};
use fleetwatch_db::models::status::{DeviceStatus, TicketStatus};
use fleetwatch_db::models::ticket::{CreateTicket, Ticket};

#[async_trait]
pub trait Store: Send + Sync {
    // -- Devices --------------------------------------------------------------

    /// Register a device. It starts `UP`.
    async fn create_device(&self, input: &CreateDevice) -> Result<Device, CoreError>;

    /// Every known device, in registration order.
    async fn get_all_devices(&self) -> Result<Vec<Device>, PipelineError>;

    async fn update_device_status(
        &self,
        id: DbId,
        status: DeviceStatus,
    ) -> Result<(), PipelineError>;

    // -- Alerts ---------------------------------------------------------------

    /// Insert an alert. Fails if another alert already references the same
    /// source event.
    async fn create_alert(&self, input: &CreateAlert) -> Result<Alert, PipelineError>;

    async fn find_alert_by_source_event(
        &self,
        event_id: EventId,
    ) -> Result<Option<Alert>, PipelineError>;

    /// Alerts whose ticket was never written, oldest first.
    async fn list_alerts_without_ticket(&self) -> Result<Vec<Alert>, PipelineError>;

    async fn list_alerts(&self) -> Result<Vec<Alert>, PipelineError>;

    // -- Tickets --------------------------------------------------------------

    /// Open a ticket for an alert. Fails if the alert already has one.
    async fn create_ticket(&self, input: &CreateTicket) -> Result<Ticket, PipelineError>;

    async fn find_ticket_by_alert(&self, alert_id: DbId) -> Result<Option<Ticket>, PipelineError>;

    async fn list_tickets(&self) -> Result<Vec<Ticket>, PipelineError>;

    /// Operator-driven workflow change.
    async fn update_ticket_status(
        &self,
        id: DbId,
        status: TicketStatus,
    ) -> Result<Ticket, CoreError>;

    /// Write an alert and its ticket as one unit.
    ///
    /// The default runs the two writes back to back, so a failure in
    /// between leaves an alert without a ticket; the consumer repairs that
    /// on the next delivery. Stores with transactions override this.
    async fn create_alert_with_ticket(
        &self,
        input: &CreateAlert,
    ) -> Result<(Alert, Ticket), PipelineError> {
        let alert = self.create_alert(input).await?;
        let ticket = self.create_ticket(&ticket_for(&alert)).await?;
        Ok((alert, ticket))
    }

    // -- Consumer cursors -----------------------------------------------------

    /// Last event the named consumer fully processed, `None` on first run.
    async fn load_cursor(&self, consumer: &str) -> Result<Option<EventId>, PipelineError>;

    async fn save_cursor(
        &self,
        consumer: &str,
        stream: &str,
        event_id: EventId,
    ) -> Result<(), PipelineError>;
}

/// The ticket that follows from an alert: same device, alert message as
/// the description.
pub fn ticket_for(alert: &Alert) -> CreateTicket {
    CreateTicket {
        device_id: alert.device_id,
        alert_id: alert.id,
        description: alert.message.clone(),
    }
}
