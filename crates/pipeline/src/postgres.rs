//! Postgres [`Store`] over the repository layer.

use async_trait::async_trait;
use fleetwatch_core::device::{validate_device_name, validate_device_type};
use fleetwatch_core::error::{CoreError, PipelineError};
use fleetwatch_core::types::{DbId, EventId};
use fleetwatch_db::models::alert::{Alert, CreateAlert};
use fleetwatch_db::models::device::{CreateDevice, Device};
use fleetwatch_db::models::status::{DeviceStatus, TicketStatus};
use fleetwatch_db::models::ticket::{CreateTicket, Ticket};
use fleetwatch_db::repositories::{AlertRepo, CursorRepo, DeviceRepo, TicketRepo};
use fleetwatch_db::DbPool;

use crate::store::Store;

/// Classify a database error for the pipeline.
///
/// Foreign-key and check violations, and SQLSTATE class 22 data errors
/// (value too long, bad numeric value), fail the same way on every attempt
/// and are payload errors. Everything else (connection loss, lock timeouts,
/// unique races) is worth another pass.
fn pipeline_error(err: sqlx::Error) -> PipelineError {
    if let Some(db) = err.as_database_error() {
        let data_exception = db.code().is_some_and(|code| code.starts_with("22"));
        if db.is_foreign_key_violation() || db.is_check_violation() || data_exception {
            return PipelineError::payload(db);
        }
    }
    PipelineError::store(err)
}

fn core_error(err: sqlx::Error) -> CoreError {
    CoreError::Internal(err.to_string())
}

/// [`Store`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_device(&self, input: &CreateDevice) -> Result<Device, CoreError> {
        validate_device_name(&input.name)?;
        validate_device_type(&input.device_type)?;
        DeviceRepo::create(&self.pool, input)
            .await
            .map_err(core_error)
    }

    async fn get_all_devices(&self) -> Result<Vec<Device>, PipelineError> {
        DeviceRepo::list(&self.pool).await.map_err(pipeline_error)
    }

    async fn update_device_status(
        &self,
        id: DbId,
        status: DeviceStatus,
    ) -> Result<(), PipelineError> {
        let updated = DeviceRepo::update_status(&self.pool, id, status)
            .await
            .map_err(pipeline_error)?;
        if !updated {
            tracing::warn!(device_id = id, "Status update matched no device");
        }
        Ok(())
    }

    async fn create_alert(&self, input: &CreateAlert) -> Result<Alert, PipelineError> {
        AlertRepo::create(&self.pool, input)
            .await
            .map_err(pipeline_error)
    }

    async fn find_alert_by_source_event(
        &self,
        event_id: EventId,
    ) -> Result<Option<Alert>, PipelineError> {
        AlertRepo::find_by_source_event(&self.pool, event_id)
            .await
            .map_err(pipeline_error)
    }

    async fn list_alerts_without_ticket(&self) -> Result<Vec<Alert>, PipelineError> {
        AlertRepo::list_without_ticket(&self.pool)
            .await
            .map_err(pipeline_error)
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, PipelineError> {
        AlertRepo::list(&self.pool).await.map_err(pipeline_error)
    }

    async fn create_ticket(&self, input: &CreateTicket) -> Result<Ticket, PipelineError> {
        TicketRepo::create(&self.pool, input)
            .await
            .map_err(pipeline_error)
    }

    async fn find_ticket_by_alert(&self, alert_id: DbId) -> Result<Option<Ticket>, PipelineError> {
        TicketRepo::find_by_alert(&self.pool, alert_id)
            .await
            .map_err(pipeline_error)
    }

    async fn list_tickets(&self) -> Result<Vec<Ticket>, PipelineError> {
        TicketRepo::list(&self.pool).await.map_err(pipeline_error)
    }

    async fn update_ticket_status(
        &self,
        id: DbId,
        status: TicketStatus,
    ) -> Result<Ticket, CoreError> {
        TicketRepo::update_status(&self.pool, id, status)
            .await
            .map_err(core_error)?
            .ok_or(CoreError::NotFound { entity: "ticket", id })
    }

    /// Single transaction: an alert never commits without its ticket.
    async fn create_alert_with_ticket(
        &self,
        input: &CreateAlert,
    ) -> Result<(Alert, Ticket), PipelineError> {
        AlertRepo::create_with_ticket(&self.pool, input)
            .await
            .map_err(pipeline_error)
    }

    async fn load_cursor(&self, consumer: &str) -> Result<Option<EventId>, PipelineError> {
        Ok(CursorRepo::find(&self.pool, consumer)
            .await
            .map_err(pipeline_error)?
            .map(|c| c.last_event_id))
    }

    async fn save_cursor(
        &self,
        consumer: &str,
        stream: &str,
        event_id: EventId,
    ) -> Result<(), PipelineError> {
        CursorRepo::upsert(&self.pool, consumer, stream, event_id)
            .await
            .map_err(pipeline_error)?;
        Ok(())
    }
}
