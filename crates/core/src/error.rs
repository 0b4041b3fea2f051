//! Domain errors shared by every crate; the api maps each variant to an
//! HTTP status.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Caller input that can never succeed as given.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The request is valid but the machine's current state forbids it,
    /// e.g. reprovisioning while a run is in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data this build cannot interpret.
    #[error("Internal error: {0}")]
    Internal(String),
}
