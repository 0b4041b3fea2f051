//! Machine entity model and DTOs.

use std::str::FromStr;

use creator_core::error::CoreError;
use creator_core::machine::MachineStatus;
use creator_core::provision::ProvisionInputs;
use creator_core::stream_messages::MachineSnapshot;
use creator_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (match database tables)
// ---------------------------------------------------------------------------

/// A row from the `machines` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Machine {
    pub id: DbId,
    pub name: String,
    pub address: String,
    pub provider: String,
    pub status: String,
    pub credential_removed: bool,
    pub extracted_output: String,
    /// Credentials and integrations replayed on reprovision. Never serialized.
    #[serde(skip)]
    pub provision_inputs: Json<ProvisionInputs>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Machine {
    /// Parse the stored status string.
    pub fn parsed_status(&self) -> Result<MachineStatus, CoreError> {
        MachineStatus::from_str(&self.status)
    }

    /// Snapshot sent to viewers when a streaming session starts.
    pub fn snapshot(&self) -> Result<MachineSnapshot, CoreError> {
        Ok(MachineSnapshot {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
            status: self.parsed_status()?,
            credential_removed: self.credential_removed,
        })
    }
}

// ---------------------------------------------------------------------------
// Create DTOs
// ---------------------------------------------------------------------------

/// DTO for recording a machine the provider has just created.
#[derive(Debug, Clone)]
pub struct CreateMachine {
    pub id: DbId,
    pub name: String,
    pub address: String,
    pub provider: String,
    pub provision_inputs: ProvisionInputs,
}
