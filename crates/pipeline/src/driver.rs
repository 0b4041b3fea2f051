//! Per-machine pipeline driver.
//!
//! Sequences readiness probing and the configuration run for one machine,
//! writing every state change through [`ProvisionStore`] and signalling the
//! [`LogHub`] after each one. Runs are spawned in the background; the
//! request that triggers one returns immediately.
//!
//! ```text
//! provisioning ── probe ── configuration run ──exit 0──▶ ready
//!                   │               │
//!                   └── timeout ────┴── non-zero / launch error ──▶ failed
//! ```

use std::sync::Arc;

use creator_core::machine::MachineStatus;
use creator_core::provision::ProvisionInputs;
use creator_core::redaction::SecretRedactor;
use creator_core::types::DbId;
use creator_events::LogHub;
use tokio::task::JoinHandle;

use crate::error::{PipelineError, StoreError};
use crate::prober::ReadinessProber;
use crate::progress::{ProgressLogger, ProgressSink};
use crate::runner::ConfigurationRunner;
use crate::store::ProvisionStore;

/// Lines of tool output kept in the debug log when a run fails.
const FAILURE_TAIL_LINES: usize = 40;

/// Which readiness check a run starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Freshly created machine: full warm-up probe.
    Initial,
    /// Existing machine: quick probe.
    Reprovision,
}

/// Drives provisioning runs. Shared via `Arc`.
pub struct ProvisionPipeline {
    store: Arc<dyn ProvisionStore>,
    hub: Arc<LogHub>,
    prober: ReadinessProber,
    runner: ConfigurationRunner,
}

impl ProvisionPipeline {
    pub fn new(
        store: Arc<dyn ProvisionStore>,
        hub: Arc<LogHub>,
        prober: ReadinessProber,
        runner: ConfigurationRunner,
    ) -> Self {
        Self {
            store,
            hub,
            prober,
            runner,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProvisionStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<LogHub> {
        &self.hub
    }

    /// Progress logger bound to one machine.
    pub fn logger(&self, machine_id: DbId) -> ProgressLogger {
        ProgressLogger::new(machine_id, Arc::clone(&self.store), Arc::clone(&self.hub))
    }

    /// Run the pipeline in a detached task.
    pub fn spawn(
        self: &Arc<Self>,
        machine_id: DbId,
        address: String,
        inputs: ProvisionInputs,
        mode: RunMode,
    ) -> JoinHandle<MachineStatus> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(machine_id, &address, &inputs, mode).await })
    }

    /// Clear the machine's log, wake its viewers, and spawn a
    /// [`RunMode::Reprovision`] run.
    ///
    /// The caller must already have moved the machine back to
    /// `provisioning`; that transition is what serializes runs.
    pub async fn start_reprovision(
        self: &Arc<Self>,
        machine_id: DbId,
        address: String,
        inputs: ProvisionInputs,
    ) -> Result<JoinHandle<MachineStatus>, StoreError> {
        self.store.clear_log(machine_id).await?;
        self.hub.notify(machine_id).await;
        Ok(self.spawn(machine_id, address, inputs, RunMode::Reprovision))
    }

    /// Run the pipeline to a terminal status and return it.
    pub async fn run(
        &self,
        machine_id: DbId,
        address: &str,
        inputs: &ProvisionInputs,
        mode: RunMode,
    ) -> MachineStatus {
        let log = self.logger(machine_id);
        tracing::info!(machine_id, %address, ?mode, inputs = %inputs.describe(), "Provisioning run started");

        let outcome = self.execute(machine_id, address, inputs, mode, &log).await;
        let status = match outcome {
            Ok(()) => MachineStatus::Ready,
            Err(e) => {
                tracing::error!(machine_id, error = %e, "Provisioning run failed");
                if let PipelineError::ConfigurationFailed { output, .. } = &e {
                    let redactor = SecretRedactor::new(inputs.secrets());
                    tracing::debug!(
                        machine_id,
                        output = %output_tail(output, &redactor),
                        "Configuration tool output before failure",
                    );
                }
                log.line(&format!("Provisioning failed: {e}")).await;
                MachineStatus::Failed
            }
        };

        self.finish(machine_id, status).await;
        tracing::info!(machine_id, %status, "Provisioning run finished");
        status
    }

    async fn execute(
        &self,
        machine_id: DbId,
        address: &str,
        inputs: &ProvisionInputs,
        mode: RunMode,
        log: &ProgressLogger,
    ) -> Result<(), PipelineError> {
        match mode {
            RunMode::Initial => {
                log.line("Waiting for SSH to become available...").await;
                self.prober.wait_for_reachable(address, log).await?;
            }
            RunMode::Reprovision => {
                log.line("Re-provisioning server...").await;
                self.prober.check_reachable(address, log).await?;
            }
        }

        let outputs = self.runner.run(address, inputs, log).await?;

        if !outputs.wallet_address.is_empty() {
            log.line(&format!("Wallet address: {}", outputs.wallet_address))
                .await;
            if let Err(e) = self
                .store
                .set_extracted_output(machine_id, &outputs.wallet_address)
                .await
            {
                tracing::warn!(machine_id, error = %e, "Failed to record wallet address");
            }
        }

        if inputs.installs_access_key() {
            if let Err(e) = self.store.set_credential_removed(machine_id, true).await {
                tracing::warn!(machine_id, error = %e, "Failed to record credential removal");
            }
        }

        Ok(())
    }

    async fn finish(&self, machine_id: DbId, status: MachineStatus) {
        if let Err(e) = self.store.set_status(machine_id, status).await {
            tracing::error!(machine_id, %status, error = %e, "Failed to record final status");
        }
        self.hub.notify(machine_id).await;
    }
}

/// Last [`FAILURE_TAIL_LINES`] lines of `output`, redacted.
fn output_tail(output: &str, redactor: &SecretRedactor) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
    lines[start..]
        .iter()
        .map(|line| redactor.redact(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_tail_is_bounded_and_redacted() {
        let mut output: String = (0..100).map(|i| format!("line {i}\n")).collect();
        output.push_str("fatal: token sk-live-abcdef rejected\n");
        let redactor = SecretRedactor::new(["sk-live-abcdef".to_string()]);

        let tail = output_tail(&output, &redactor);
        let lines: Vec<&str> = tail.lines().collect();

        assert_eq!(lines.len(), FAILURE_TAIL_LINES);
        assert_eq!(lines[0], "line 61");
        assert_eq!(*lines.last().unwrap(), "fatal: token sk-*** rejected");
        assert!(!tail.contains("abcdef"));
    }

    #[test]
    fn short_output_is_kept_whole() {
        let tail = output_tail("a\nb\n", &SecretRedactor::new(Vec::new()));
        assert_eq!(tail, "a\nb");
    }
}
