//! Provider trait and shared types.

use async_trait::async_trait;
use creator_core::types::DbId;

/// A machine the provider has finished creating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedMachine {
    /// Provider-assigned numeric id, reused as the machine's primary key.
    pub id: DbId,
    pub name: String,
    /// Public IPv4 address. Never empty.
    pub address: String,
}

/// Errors from a cloud provider API.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A provider-side action finished in an error state.
    #[error("Provider action {action_id} failed: {message}")]
    ActionFailed { action_id: i64, message: String },

    /// The action did not finish within the allowed time.
    #[error("Provider action {action_id} did not finish within {waited_secs}s")]
    ActionTimeout { action_id: i64, waited_secs: u64 },

    /// The machine was created but has no public address.
    #[error("Machine {0} has no public IPv4 address")]
    MissingAddress(DbId),
}

/// Creates and deletes machines on a cloud provider.
#[async_trait]
pub trait MachineProvider: Send + Sync {
    /// Short provider name stored on the machine row, e.g. `hetzner`.
    fn name(&self) -> &'static str;

    /// Create a machine and wait until it has a public address.
    async fn create_machine(&self, name: &str) -> Result<ProvisionedMachine, ProviderError>;

    /// Delete a machine. Deleting an already-deleted machine is an error
    /// from the provider, which callers surface to the user.
    async fn delete_machine(&self, id: DbId) -> Result<(), ProviderError>;
}
