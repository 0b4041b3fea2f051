//! Provisioning log entry model.

use serde::Serialize;
use sqlx::FromRow;
use creator_core::types::{DbId, Timestamp};

/// A row from the `machine_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogEntry {
    pub id: DbId,
    pub machine_id: DbId,
    pub line: String,
    pub created_at: Timestamp,
}
