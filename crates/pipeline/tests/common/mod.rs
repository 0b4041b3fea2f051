//! Shared helpers for pipeline integration tests.
//!
//! [`MemoryStore`] stands in for Postgres; [`pipeline_with`] wires a
//! pipeline whose prober targets a local port and whose configuration tool
//! is a bash script.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use creator_core::machine::MachineStatus;
use creator_core::stream_messages::MachineSnapshot;
use creator_core::types::DbId;
use creator_db::models::log_entry::LogEntry;
use creator_events::LogHub;
use creator_pipeline::{
    ConfigurationRunner, ProbePolicy, ProvisionPipeline, ProvisionStore, ReadinessProber,
    RunnerConfig, StoreError,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct State {
    next_log_id: DbId,
    machines: HashMap<DbId, (MachineSnapshot, String)>,
    logs: Vec<LogEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_machine(&self, id: DbId, address: &str) {
        let snapshot = MachineSnapshot {
            id,
            name: format!("claw-test-{id}"),
            address: address.to_string(),
            status: MachineStatus::Provisioning,
            credential_removed: false,
        };
        self.state
            .lock()
            .await
            .machines
            .insert(id, (snapshot, String::new()));
    }

    pub async fn lines(&self, machine_id: DbId) -> Vec<String> {
        self.state
            .lock()
            .await
            .logs
            .iter()
            .filter(|e| e.machine_id == machine_id)
            .map(|e| e.line.clone())
            .collect()
    }

    pub async fn extracted_output(&self, machine_id: DbId) -> String {
        self.state
            .lock()
            .await
            .machines
            .get(&machine_id)
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProvisionStore for MemoryStore {
    async fn append(&self, machine_id: DbId, line: &str) -> Result<DbId, StoreError> {
        let mut state = self.state.lock().await;
        state.next_log_id += 1;
        let id = state.next_log_id;
        state.logs.push(LogEntry {
            id,
            machine_id,
            line: line.to_string(),
            created_at: chrono::Utc::now(),
        });
        Ok(id)
    }

    async fn entries_after(
        &self,
        machine_id: DbId,
        after_id: DbId,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|e| e.machine_id == machine_id && e.id > after_id)
            .cloned()
            .collect())
    }

    async fn clear_log(&self, machine_id: DbId) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .logs
            .retain(|e| e.machine_id != machine_id);
        Ok(())
    }

    async fn snapshot(&self, machine_id: DbId) -> Result<Option<MachineSnapshot>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.machines.get(&machine_id).map(|(s, _)| s.clone()))
    }

    async fn set_status(&self, machine_id: DbId, status: MachineStatus) -> Result<(), StoreError> {
        if let Some((s, _)) = self.state.lock().await.machines.get_mut(&machine_id) {
            s.status = status;
        }
        Ok(())
    }

    async fn set_extracted_output(&self, machine_id: DbId, value: &str) -> Result<(), StoreError> {
        if let Some((_, out)) = self.state.lock().await.machines.get_mut(&machine_id) {
            *out = value.to_string();
        }
        Ok(())
    }

    async fn set_credential_removed(
        &self,
        machine_id: DbId,
        removed: bool,
    ) -> Result<(), StoreError> {
        if let Some((s, _)) = self.state.lock().await.machines.get_mut(&machine_id) {
            s.credential_removed = removed;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipeline wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub hub: Arc<LogHub>,
    pub pipeline: Arc<ProvisionPipeline>,
    /// Keeps the playbook script alive.
    pub dir: tempfile::TempDir,
}

/// Probe policy against `port` with millisecond timings.
pub fn fast_policy(port: u16, attempts: u32) -> ProbePolicy {
    ProbePolicy {
        warmup: Duration::ZERO,
        interval: Duration::from_millis(10),
        attempts,
        connect_timeout: Duration::from_millis(500),
        port,
    }
}

/// Listener kept alive for the duration of a test.
pub async fn open_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

pub async fn closed_port() -> u16 {
    let (listener, port) = open_port().await;
    drop(listener);
    port
}

/// Build a pipeline whose probes hit `port` and whose configuration tool
/// runs `script` with bash.
pub fn pipeline_with(port: u16, script: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("play.sh"), script).unwrap();

    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(LogHub::new());
    let runner = ConfigurationRunner::new(RunnerConfig {
        program: "bash".into(),
        playbook: "play.sh".into(),
        working_dir: dir.path().to_path_buf(),
        private_key_path: PathBuf::from("/keys/id_ed25519"),
        extra_args: Vec::new(),
        stall_threshold: Duration::from_secs(30),
    });
    let prober = ReadinessProber::new(fast_policy(port, 3), fast_policy(port, 2));
    let pipeline = Arc::new(ProvisionPipeline::new(
        store.clone(),
        hub.clone(),
        prober,
        runner,
    ));

    Harness {
        store,
        hub,
        pipeline,
        dir,
    }
}
