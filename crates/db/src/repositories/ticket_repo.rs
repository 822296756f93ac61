//! Repository for the `tickets` table.

use fleetwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::status::TicketStatus;
use crate::models::ticket::{CreateTicket, Ticket};

/// Column list for `tickets` queries.
const COLUMNS: &str =
    "id, device_id, alert_id, description, status_id, created_at, updated_at";

/// Provides CRUD operations for follow-up tickets.
pub struct TicketRepo;

impl TicketRepo {
    /// Open a ticket for an alert. Status defaults to `OPEN`.
    ///
    /// Fails with a unique violation if the alert already has a ticket.
    pub async fn create(pool: &PgPool, input: &CreateTicket) -> Result<Ticket, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::create_inner(&mut conn, input).await
    }

    /// Insert a ticket on an existing connection or transaction.
    pub(crate) async fn create_inner(
        conn: &mut sqlx::PgConnection,
        input: &CreateTicket,
    ) -> Result<Ticket, sqlx::Error> {
        let query = format!(
            "INSERT INTO tickets (device_id, alert_id, description) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(input.device_id)
            .bind(input.alert_id)
            .bind(&input.description)
            .fetch_one(conn)
            .await
    }

    /// Find the ticket spawned by the given alert, if any.
    pub async fn find_by_alert(
        pool: &PgPool,
        alert_id: DbId,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tickets WHERE alert_id = $1");
        sqlx::query_as::<_, Ticket>(&query)
            .bind(alert_id)
            .fetch_optional(pool)
            .await
    }

    /// List all tickets, oldest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Ticket>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tickets ORDER BY id");
        sqlx::query_as::<_, Ticket>(&query).fetch_all(pool).await
    }

    /// Move a ticket through its workflow.
    ///
    /// Returns `None` if the ticket does not exist.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        let query = format!(
            "UPDATE tickets SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .bind(status.id())
            .fetch_optional(pool)
            .await
    }
}
