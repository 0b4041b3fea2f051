//! Repository for the `machine_logs` table.

use creator_core::types::DbId;
use sqlx::PgPool;

use crate::models::log_entry::LogEntry;

/// Column list for `machine_logs` queries.
const COLUMNS: &str = "id, machine_id, line, created_at";

/// Provides query operations for the append-only provisioning log.
pub struct MachineLogRepo;

impl MachineLogRepo {
    /// Append one line; the sequence assigns the next id.
    pub async fn append(pool: &PgPool, machine_id: DbId, line: &str) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO machine_logs (machine_id, line) VALUES ($1, $2) RETURNING id",
        )
        .bind(machine_id)
        .bind(line)
        .fetch_one(pool)
        .await
    }

    /// All entries with `id > after_id`, in id order.
    pub async fn entries_after(
        pool: &PgPool,
        machine_id: DbId,
        after_id: DbId,
    ) -> Result<Vec<LogEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM machine_logs \
             WHERE machine_id = $1 AND id > $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, LogEntry>(&query)
            .bind(machine_id)
            .bind(after_id)
            .fetch_all(pool)
            .await
    }

    /// Delete every entry of a machine. Only used when reprovisioning.
    pub async fn clear(pool: &PgPool, machine_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM machine_logs WHERE machine_id = $1")
            .bind(machine_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
