//! Repository for the `devices` table.

use fleetwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::device::{CreateDevice, Device};
use crate::models::status::DeviceStatus;

/// Column list for `devices` queries.
const COLUMNS: &str = "id, name, device_type, status_id, created_at, updated_at";

/// Provides CRUD operations for monitored devices.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Register a new device. Status defaults to `UP`.
    pub async fn create(pool: &PgPool, input: &CreateDevice) -> Result<Device, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (name, device_type) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(&input.name)
            .bind(&input.device_type)
            .fetch_one(pool)
            .await
    }

    /// List every known device, oldest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices ORDER BY id");
        sqlx::query_as::<_, Device>(&query).fetch_all(pool).await
    }

    /// Persist a newly observed health status.
    ///
    /// Returns `false` if the device does not exist.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: DeviceStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET status_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
