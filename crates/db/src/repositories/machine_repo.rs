//! Repository for the `machines` table.

use creator_core::machine::{MachineStatus, INTERRUPTED_LINE};
use creator_core::provision::ProvisionInputs;
use creator_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::machine::{CreateMachine, Machine};

/// Column list for `machines` queries.
const COLUMNS: &str = "\
    id, name, address, provider, status, credential_removed, \
    extracted_output, provision_inputs, created_at, updated_at";

/// Provides query operations for machines.
///
/// Status, extracted output and the credential flag are independent point
/// writes; none of them spans a transaction with another field.
pub struct MachineRepo;

impl MachineRepo {
    /// Insert a freshly created machine in `provisioning` status.
    pub async fn create(pool: &PgPool, input: &CreateMachine) -> Result<Machine, sqlx::Error> {
        let query = format!(
            "INSERT INTO machines (id, name, address, provider, status, provision_inputs) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Machine>(&query)
            .bind(input.id)
            .bind(&input.name)
            .bind(&input.address)
            .bind(&input.provider)
            .bind(MachineStatus::Provisioning.as_str())
            .bind(Json(&input.provision_inputs))
            .fetch_one(pool)
            .await
    }

    /// Find a machine by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Machine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM machines WHERE id = $1");
        sqlx::query_as::<_, Machine>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all machines, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Machine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM machines ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, Machine>(&query).fetch_all(pool).await
    }

    /// Delete a machine (its log rows cascade). Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load the inputs recorded at creation time.
    pub async fn provision_inputs(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProvisionInputs>, sqlx::Error> {
        let row: Option<(Json<ProvisionInputs>,)> =
            sqlx::query_as("SELECT provision_inputs FROM machines WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(inputs,)| inputs.0))
    }

    /// Set the lifecycle status.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: MachineStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE machines SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record the value extracted from the configuration tool's output.
    pub async fn set_extracted_output(
        pool: &PgPool,
        id: DbId,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE machines SET extracted_output = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record whether the provider's default access credential was revoked.
    pub async fn set_credential_removed(
        pool: &PgPool,
        id: DbId,
        removed: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE machines SET credential_removed = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(removed)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Move a terminal machine back to `provisioning` and clear its
    /// extracted output.
    ///
    /// The status check and the write are one statement, so of two
    /// concurrent triggers only one gets the row back. Returns `None` when
    /// the machine does not exist or is still provisioning.
    pub async fn begin_reprovision(pool: &PgPool, id: DbId) -> Result<Option<Machine>, sqlx::Error> {
        let query = format!(
            "UPDATE machines \
             SET status = $2, extracted_output = '', updated_at = NOW() \
             WHERE id = $1 AND status IN ($3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Machine>(&query)
            .bind(id)
            .bind(MachineStatus::Provisioning.as_str())
            .bind(MachineStatus::Ready.as_str())
            .bind(MachineStatus::Failed.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark every machine left in `provisioning` by a previous process as
    /// `failed`, appending [`INTERRUPTED_LINE`] to each one's log.
    ///
    /// Called once at startup before any pipeline can run. Returns the ids
    /// that were failed.
    pub async fn fail_interrupted(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ids: Vec<DbId> = sqlx::query_scalar(
            "UPDATE machines SET status = $1, updated_at = NOW() \
             WHERE status = $2 \
             RETURNING id",
        )
        .bind(MachineStatus::Failed.as_str())
        .bind(MachineStatus::Provisioning.as_str())
        .fetch_all(&mut *tx)
        .await?;

        if !ids.is_empty() {
            sqlx::query(
                "INSERT INTO machine_logs (machine_id, line) \
                 SELECT id, $2 FROM UNNEST($1::BIGINT[]) AS t(id) ORDER BY id",
            )
            .bind(&ids)
            .bind(INTERRUPTED_LINE)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Marked interrupted provisioning runs as failed");
        }
        Ok(ids)
    }
}
