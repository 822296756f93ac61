//! Repository for the `alerts` table.

use fleetwatch_core::types::EventId;
use sqlx::PgPool;

use crate::models::alert::{Alert, CreateAlert};
use crate::models::ticket::{CreateTicket, Ticket};
use crate::repositories::TicketRepo;

/// Column list for `alerts` queries.
const COLUMNS: &str = "id, device_id, message, severity, source_event_id, created_at";

/// Provides read/write operations for alerts.
pub struct AlertRepo;

impl AlertRepo {
    /// Insert a new alert.
    ///
    /// Fails with a unique violation if an alert already references
    /// `source_event_id`.
    pub async fn create(pool: &PgPool, input: &CreateAlert) -> Result<Alert, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::create_inner(&mut conn, input).await
    }

    /// Insert an alert and the ticket that follows from it in one
    /// transaction, so neither exists without the other.
    ///
    /// The ticket description is the alert message.
    pub async fn create_with_ticket(
        pool: &PgPool,
        input: &CreateAlert,
    ) -> Result<(Alert, Ticket), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let alert = Self::create_inner(&mut tx, input).await?;
        let ticket = TicketRepo::create_inner(
            &mut tx,
            &CreateTicket {
                device_id: alert.device_id,
                alert_id: alert.id,
                description: alert.message.clone(),
            },
        )
        .await?;

        tx.commit().await?;
        Ok((alert, ticket))
    }

    async fn create_inner(
        conn: &mut sqlx::PgConnection,
        input: &CreateAlert,
    ) -> Result<Alert, sqlx::Error> {
        let query = format!(
            "INSERT INTO alerts (device_id, message, severity, source_event_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Alert>(&query)
            .bind(input.device_id)
            .bind(&input.message)
            .bind(&input.severity)
            .bind(input.source_event_id)
            .fetch_one(conn)
            .await
    }

    /// Find the alert created from a given stream event, if any.
    pub async fn find_by_source_event(
        pool: &PgPool,
        source_event_id: EventId,
    ) -> Result<Option<Alert>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM alerts WHERE source_event_id = $1");
        sqlx::query_as::<_, Alert>(&query)
            .bind(source_event_id)
            .fetch_optional(pool)
            .await
    }

    /// List all alerts in creation order.
    pub async fn list(pool: &PgPool) -> Result<Vec<Alert>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM alerts ORDER BY id");
        sqlx::query_as::<_, Alert>(&query).fetch_all(pool).await
    }

    /// List alerts that have no ticket yet, oldest first.
    pub async fn list_without_ticket(pool: &PgPool) -> Result<Vec<Alert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM alerts a \
             WHERE NOT EXISTS (SELECT 1 FROM tickets t WHERE t.alert_id = a.id) \
             ORDER BY a.id"
        );
        sqlx::query_as::<_, Alert>(&query).fetch_all(pool).await
    }
}
