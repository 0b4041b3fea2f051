//! Progress reporting for a single run.

use std::sync::Arc;

use async_trait::async_trait;
use creator_core::machine::DEFAULT_KEY_REMOVED_MARKER;
use creator_core::types::DbId;
use creator_events::LogHub;

use crate::store::ProvisionStore;

/// Receiver of human-readable progress lines.
///
/// Lines must already be redacted. Implementations never fail the caller.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn line(&self, line: &str);
}

/// Persists each line for one machine and wakes its viewers.
///
/// Storage failures are logged and swallowed so a run keeps going. The
/// credential-removed flag is derived from the playbook's own output: a
/// line containing [`DEFAULT_KEY_REMOVED_MARKER`] sets it. Renaming that
/// task in the playbook silently breaks the flag.
#[derive(Clone)]
pub struct ProgressLogger {
    machine_id: DbId,
    store: Arc<dyn ProvisionStore>,
    hub: Arc<LogHub>,
}

impl ProgressLogger {
    pub fn new(machine_id: DbId, store: Arc<dyn ProvisionStore>, hub: Arc<LogHub>) -> Self {
        Self {
            machine_id,
            store,
            hub,
        }
    }

    pub fn machine_id(&self) -> DbId {
        self.machine_id
    }
}

#[async_trait]
impl ProgressSink for ProgressLogger {
    async fn line(&self, line: &str) {
        if let Err(e) = self.store.append(self.machine_id, line).await {
            tracing::warn!(machine_id = self.machine_id, error = %e, "Failed to append log line");
        }
        self.hub.notify(self.machine_id).await;

        if line.contains(DEFAULT_KEY_REMOVED_MARKER) {
            match self.store.set_credential_removed(self.machine_id, true).await {
                Ok(()) => {
                    tracing::info!(machine_id = self.machine_id, "Default access key removed");
                    self.hub.notify(self.machine_id).await;
                }
                Err(e) => {
                    tracing::warn!(
                        machine_id = self.machine_id,
                        error = %e,
                        "Failed to record credential removal",
                    );
                }
            }
        }
    }
}

/// Collects lines in memory. Used by tests across the workspace.
#[derive(Debug, Default)]
pub struct CollectedLines {
    lines: tokio::sync::Mutex<Vec<String>>,
}

impl CollectedLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl ProgressSink for CollectedLines {
    async fn line(&self, line: &str) {
        self.lines.lock().await.push(line.to_string());
    }
}
