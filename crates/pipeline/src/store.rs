//! Storage seam used by the pipeline and the streaming gateway.
//!
//! [`ProvisionStore`] covers exactly the reads and point writes a run or a
//! viewer session makes. [`PgProvisionStore`] backs it with the repositories
//! in `creator-db`; tests substitute an in-memory implementation.

use async_trait::async_trait;
use creator_core::machine::MachineStatus;
use creator_core::stream_messages::MachineSnapshot;
use creator_core::types::DbId;
use creator_db::models::log_entry::LogEntry;
use creator_db::repositories::{MachineLogRepo, MachineRepo};
use creator_db::DbPool;

use crate::error::StoreError;

/// Durable per-machine log plus the machine fields a run may write.
///
/// Each write is independent; there is no multi-field transaction.
#[async_trait]
pub trait ProvisionStore: Send + Sync {
    /// Append a line and return its id, greater than every id issued so far.
    async fn append(&self, machine_id: DbId, line: &str) -> Result<DbId, StoreError>;

    /// All entries with `id > after_id`, in id order. Pass 0 for everything.
    async fn entries_after(
        &self,
        machine_id: DbId,
        after_id: DbId,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Delete the machine's entries. Later appends still get larger ids.
    async fn clear_log(&self, machine_id: DbId) -> Result<(), StoreError>;

    /// Current state of the machine, or `None` if it does not exist.
    async fn snapshot(&self, machine_id: DbId) -> Result<Option<MachineSnapshot>, StoreError>;

    async fn set_status(&self, machine_id: DbId, status: MachineStatus) -> Result<(), StoreError>;

    async fn set_extracted_output(&self, machine_id: DbId, value: &str) -> Result<(), StoreError>;

    async fn set_credential_removed(&self, machine_id: DbId, removed: bool)
        -> Result<(), StoreError>;
}

/// [`ProvisionStore`] over the Postgres pool.
#[derive(Clone)]
pub struct PgProvisionStore {
    pool: DbPool,
}

impl PgProvisionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn write_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::StorageWriteFailed {
        operation,
        message: e.to_string(),
    }
}

fn read_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| StoreError::StorageReadFailed {
        operation,
        message: e.to_string(),
    }
}

#[async_trait]
impl ProvisionStore for PgProvisionStore {
    async fn append(&self, machine_id: DbId, line: &str) -> Result<DbId, StoreError> {
        MachineLogRepo::append(&self.pool, machine_id, line)
            .await
            .map_err(write_failed("append"))
    }

    async fn entries_after(
        &self,
        machine_id: DbId,
        after_id: DbId,
    ) -> Result<Vec<LogEntry>, StoreError> {
        MachineLogRepo::entries_after(&self.pool, machine_id, after_id)
            .await
            .map_err(read_failed("entries_after"))
    }

    async fn clear_log(&self, machine_id: DbId) -> Result<(), StoreError> {
        let removed = MachineLogRepo::clear(&self.pool, machine_id)
            .await
            .map_err(write_failed("clear_log"))?;
        tracing::debug!(machine_id, removed, "Cleared provisioning log");
        Ok(())
    }

    async fn snapshot(&self, machine_id: DbId) -> Result<Option<MachineSnapshot>, StoreError> {
        let machine = MachineRepo::find_by_id(&self.pool, machine_id)
            .await
            .map_err(read_failed("snapshot"))?;
        machine
            .map(|m| m.snapshot())
            .transpose()
            .map_err(|e| StoreError::StorageReadFailed {
                operation: "snapshot",
                message: e.to_string(),
            })
    }

    async fn set_status(&self, machine_id: DbId, status: MachineStatus) -> Result<(), StoreError> {
        MachineRepo::set_status(&self.pool, machine_id, status)
            .await
            .map_err(write_failed("set_status"))
    }

    async fn set_extracted_output(&self, machine_id: DbId, value: &str) -> Result<(), StoreError> {
        MachineRepo::set_extracted_output(&self.pool, machine_id, value)
            .await
            .map_err(write_failed("set_extracted_output"))
    }

    async fn set_credential_removed(
        &self,
        machine_id: DbId,
        removed: bool,
    ) -> Result<(), StoreError> {
        MachineRepo::set_credential_removed(&self.pool, machine_id, removed)
            .await
            .map_err(write_failed("set_credential_removed"))
    }
}
