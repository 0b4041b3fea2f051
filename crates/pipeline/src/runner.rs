//! Configuration tool execution.
//!
//! [`ConfigurationRunner::run`] writes a temporary single-host inventory,
//! launches the tool against it, and streams its stdout and stderr line by
//! line. Every forwarded line passes through a [`SecretRedactor`] built from
//! the run's inputs; the un-redacted transcript is kept only in memory for
//! marker extraction and is never logged or persisted.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use creator_core::extraction::extract_wallet_address;
use creator_core::line_splitter::LineSplitter;
use creator_core::provision::ProvisionInputs;
use creator_core::redaction::SecretRedactor;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::progress::ProgressSink;

/// Inventory group the playbook targets.
const INVENTORY_GROUP: &str = "openclaw";

/// Read buffer per output stream.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Upper bound on the retained transcript (4 MiB). Older output is dropped
/// first; the markers of interest are printed near the end of a run.
const MAX_TRANSCRIPT_BYTES: usize = 4 * 1024 * 1024;

/// How to launch the configuration tool.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Executable, e.g. `ansible-playbook`.
    pub program: String,
    /// First argument, resolved against `working_dir`.
    pub playbook: String,
    pub working_dir: PathBuf,
    /// Key written into the inventory for the tool's SSH connection.
    pub private_key_path: PathBuf,
    /// Extra arguments placed after the inventory, e.g. `-vv`.
    pub extra_args: Vec<String>,
    /// Silence longer than this emits a "no output" progress warning.
    pub stall_threshold: Duration,
}

/// Values extracted from a successful run. Empty strings mean the marker
/// was not printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutputs {
    pub wallet_address: String,
}

/// Runs the configuration tool against one machine.
#[derive(Debug, Clone)]
pub struct ConfigurationRunner {
    config: RunnerConfig,
}

impl ConfigurationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the tool to completion against `address`.
    ///
    /// Returns [`PipelineError::ConfigurationFailed`] on a non-zero exit,
    /// carrying the full transcript.
    pub async fn run(
        &self,
        address: &str,
        inputs: &ProvisionInputs,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutputs, PipelineError> {
        let started = Instant::now();
        progress.line("Starting configuration run...").await;

        // Dropping the handle deletes the file, on every exit path.
        let inventory = write_inventory(address, &self.config.private_key_path)
            .map_err(PipelineError::Inventory)?;

        let mut cmd = Command::new(&self.config.program);
        cmd.arg(&self.config.playbook)
            .arg("-i")
            .arg(inventory.path())
            .args(&self.config.extra_args);
        if let Some(vars) = inputs.extra_vars() {
            cmd.arg("--extra-vars").arg(vars.to_string());
        }
        cmd.current_dir(&self.config.working_dir)
            .env("ANSIBLE_FORCE_COLOR", "false")
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            %address,
            program = %self.config.program,
            playbook = %self.config.playbook,
            inputs = %inputs.describe(),
            "Launching configuration tool",
        );
        progress
            .line(&format!(
                "Running {} {}",
                self.config.program, self.config.playbook
            ))
            .await;

        let mut child = cmd.spawn().map_err(PipelineError::Launch)?;

        let (tx, mut rx) = mpsc::channel::<String>(256);
        let stdout_task = tokio::spawn(pump_lines(child.stdout.take(), tx.clone()));
        let stderr_task = tokio::spawn(pump_lines(child.stderr.take(), tx));

        let redactor = SecretRedactor::new(inputs.secrets());
        let mut transcript = String::new();

        loop {
            match tokio::time::timeout(self.config.stall_threshold, rx.recv()).await {
                Ok(Some(line)) => {
                    append_bounded(&mut transcript, &line);
                    if line.is_empty() {
                        continue;
                    }
                    let safe = redactor.redact(&line);
                    tracing::debug!(%address, line = %safe, "configuration output");
                    progress.line(&safe).await;
                }
                // Both streams closed.
                Ok(None) => break,
                Err(_) => {
                    let waited = self.config.stall_threshold.as_secs();
                    tracing::warn!(%address, waited_secs = waited, "Configuration tool is silent");
                    progress
                        .line(&format!(
                            "No output for {waited}s (elapsed {}), still running...",
                            format_elapsed(started.elapsed())
                        ))
                        .await;
                }
            }
        }

        let status = child.wait().await.map_err(PipelineError::Launch)?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let elapsed = format_elapsed(started.elapsed());

        if !status.success() {
            tracing::error!(%address, exit_code = ?status.code(), %elapsed, "Configuration tool failed");
            progress
                .line(&format!("Provisioning FAILED after {elapsed}: {status}"))
                .await;
            return Err(PipelineError::ConfigurationFailed {
                exit_code: status.code(),
                output: transcript,
            });
        }

        tracing::info!(%address, %elapsed, "Configuration tool finished");
        progress
            .line(&format!("Provisioning completed successfully in {elapsed}"))
            .await;

        Ok(RunOutputs {
            wallet_address: extract_wallet_address(&transcript),
        })
    }
}

/// Write the single-host inventory to a fresh temporary file.
fn write_inventory(address: &str, private_key: &Path) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("inventory-")
        .suffix(".ini")
        .tempfile()?;
    write!(
        file,
        "[{INVENTORY_GROUP}]\n{address} ansible_user=root ansible_ssh_private_key_file={} \
         ansible_ssh_common_args='-o StrictHostKeyChecking=no'\n",
        private_key.display()
    )?;
    file.flush()?;
    Ok(file)
}

/// Split one output stream into lines and forward them until EOF or until
/// the receiver is gone.
async fn pump_lines<R: AsyncRead + Unpin>(handle: Option<R>, tx: mpsc::Sender<String>) {
    let Some(mut reader) = handle else {
        return;
    };
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read configuration output");
                break;
            }
        };
        for line in splitter.push(&buf[..n]) {
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send(line).await;
    }
}

fn append_bounded(transcript: &mut String, line: &str) {
    transcript.push_str(line);
    transcript.push('\n');
    if transcript.len() > MAX_TRANSCRIPT_BYTES {
        let mut cut = transcript.len() - MAX_TRANSCRIPT_BYTES / 2;
        while !transcript.is_char_boundary(cut) {
            cut += 1;
        }
        transcript.drain(..cut);
    }
}

/// Render a duration as `45s` or `3m12s`.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::progress::CollectedLines;

    /// Config that runs `script` with bash in a fresh temp dir.
    fn bash_runner(dir: &tempfile::TempDir, script: &str) -> ConfigurationRunner {
        std::fs::write(dir.path().join("play.sh"), script).unwrap();
        ConfigurationRunner::new(RunnerConfig {
            program: "bash".into(),
            playbook: "play.sh".into(),
            working_dir: dir.path().to_path_buf(),
            private_key_path: PathBuf::from("/keys/id_ed25519"),
            extra_args: vec!["-vv".into()],
            stall_threshold: Duration::from_secs(30),
        })
    }

    #[tokio::test]
    async fn success_extracts_wallet_address() {
        let dir = tempfile::tempdir().unwrap();
        let runner = bash_runner(
            &dir,
            "echo 'TASK [wallet]'\necho '  \"msg\": \"WALLET_ADDRESS=0xabc123\"'\n",
        );
        let lines = CollectedLines::new();

        let outputs = runner
            .run("192.0.2.5", &ProvisionInputs::default(), &lines)
            .await
            .unwrap();

        assert_eq!(outputs.wallet_address, "0xabc123");
        let lines = lines.lines().await;
        assert!(lines.contains(&"TASK [wallet]".to_string()));
        assert!(lines
            .last()
            .unwrap()
            .starts_with("Provisioning completed successfully in"));
    }

    #[tokio::test]
    async fn secrets_are_redacted_in_forwarded_lines() {
        let dir = tempfile::tempdir().unwrap();
        let runner = bash_runner(&dir, "echo \"key is sk-ant-abcdef123456\" >&2\n");
        let inputs = ProvisionInputs {
            anthropic_api_key: Some("sk-ant-abcdef123456".into()),
            ..Default::default()
        };
        let lines = CollectedLines::new();

        runner.run("192.0.2.5", &inputs, &lines).await.unwrap();

        let lines = lines.lines().await;
        assert!(lines.iter().any(|l| l == "key is sk-***"));
        assert!(lines.iter().all(|l| !l.contains("abcdef123456")));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_full_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = bash_runner(&dir, "echo 'fatal: unreachable'\nexit 3\n");
        let lines = CollectedLines::new();

        let err = runner
            .run("192.0.2.5", &ProvisionInputs::default(), &lines)
            .await
            .unwrap_err();

        assert_matches!(
            err,
            PipelineError::ConfigurationFailed { exit_code: Some(3), ref output }
                if output.contains("fatal: unreachable")
        );
        let lines = lines.lines().await;
        assert!(lines.last().unwrap().starts_with("Provisioning FAILED after"));
    }

    #[tokio::test]
    async fn passes_inventory_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        // $1 = -i, $2 = inventory path, $3 = -vv, $4 = --extra-vars, $5 = json
        let runner = bash_runner(
            &dir,
            "cat \"$2\"\necho \"flag=$3\"\necho \"vars=$5\"\n",
        );
        let inputs = ProvisionInputs {
            ssh_public_key: Some("ssh-ed25519 AAAA me".into()),
            ..Default::default()
        };
        let lines = CollectedLines::new();

        runner.run("198.51.100.9", &inputs, &lines).await.unwrap();

        let lines = lines.lines().await;
        assert!(lines.contains(&"[openclaw]".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("198.51.100.9 ansible_user=root")
            && l.contains("ansible_ssh_private_key_file=/keys/id_ed25519")));
        assert!(lines.contains(&"flag=-vv".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("vars=") && l.contains("clawdbot_ssh_keys")));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = bash_runner(&dir, "");
        runner.config.program = "/nonexistent/configuration-tool".into();
        let lines = CollectedLines::new();

        let err = runner
            .run("192.0.2.5", &ProvisionInputs::default(), &lines)
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Launch(_));
    }

    #[tokio::test]
    async fn silence_emits_stall_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = bash_runner(&dir, "sleep 0.5\necho done\n");
        runner.config.stall_threshold = Duration::from_millis(150);
        let lines = CollectedLines::new();

        runner
            .run("192.0.2.5", &ProvisionInputs::default(), &lines)
            .await
            .unwrap();

        let lines = lines.lines().await;
        assert!(lines.iter().any(|l| l.starts_with("No output for")));
        assert!(lines.contains(&"done".to_string()));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(192)), "3m12s");
    }

    #[test]
    fn transcript_keeps_the_tail() {
        let mut transcript = String::new();
        let chunk = "x".repeat(1024 * 1024);
        for _ in 0..5 {
            append_bounded(&mut transcript, &chunk);
        }
        append_bounded(&mut transcript, "WALLET_ADDRESS=0xfeed");
        assert!(transcript.len() <= MAX_TRANSCRIPT_BYTES);
        assert_eq!(extract_wallet_address(&transcript), "0xfeed");
    }
}
