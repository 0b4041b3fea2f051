//! Readiness probing of a machine's management port.
//!
//! A probe is only a TCP connect; nothing is spoken on the connection.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::PipelineError;
use crate::progress::ProgressSink;

/// Management (SSH) port.
pub const SSH_PORT: u16 = 22;

/// Timing for one probe sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Fixed delay before the first attempt.
    pub warmup: Duration,
    /// Delay between failed attempts.
    pub interval: Duration,
    pub attempts: u32,
    /// Per-attempt connect timeout.
    pub connect_timeout: Duration,
    pub port: u16,
}

impl ProbePolicy {
    /// Policy for a freshly created machine: 60s warm-up, then up to 60
    /// attempts 5s apart.
    pub fn full() -> Self {
        Self {
            warmup: Duration::from_secs(60),
            interval: Duration::from_secs(5),
            attempts: 60,
            connect_timeout: Duration::from_secs(5),
            port: SSH_PORT,
        }
    }

    /// Policy for a machine that should already be up: no warm-up, up to 5
    /// attempts 5s apart.
    pub fn quick() -> Self {
        Self {
            warmup: Duration::ZERO,
            interval: Duration::from_secs(5),
            attempts: 5,
            connect_timeout: Duration::from_secs(10),
            port: SSH_PORT,
        }
    }
}

/// Confirms a machine accepts connections on its management port.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    full: ProbePolicy,
    quick: ProbePolicy,
}

impl Default for ReadinessProber {
    fn default() -> Self {
        Self::new(ProbePolicy::full(), ProbePolicy::quick())
    }
}

impl ReadinessProber {
    pub fn new(full: ProbePolicy, quick: ProbePolicy) -> Self {
        Self { full, quick }
    }

    /// Wait for a newly created machine to boot.
    pub async fn wait_for_reachable(
        &self,
        address: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        let policy = &self.full;
        if !policy.warmup.is_zero() {
            progress
                .line(&format!(
                    "Waiting {}s for server to boot...",
                    policy.warmup.as_secs()
                ))
                .await;
            tokio::time::sleep(policy.warmup).await;
        }
        probe(address, policy, progress).await
    }

    /// Confirm a machine that is expected to already be running.
    pub async fn check_reachable(
        &self,
        address: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        probe(address, &self.quick, progress).await
    }
}

async fn probe(
    address: &str,
    policy: &ProbePolicy,
    progress: &dyn ProgressSink,
) -> Result<(), PipelineError> {
    let target = display_target(address, policy.port);
    progress.line(&format!("Checking SSH on {target}...")).await;

    for attempt in 1..=policy.attempts {
        let connect = TcpStream::connect((address, policy.port));
        let outcome = match tokio::time::timeout(policy.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "timed out after {}s",
                policy.connect_timeout.as_secs()
            )),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(%target, attempt, "SSH reachable");
                progress
                    .line(&format!("SSH is ready (attempt {attempt}/{})", policy.attempts))
                    .await;
                return Ok(());
            }
            Err(reason) => {
                tracing::debug!(%target, attempt, %reason, "SSH probe failed");
                progress
                    .line(&format!(
                        "SSH attempt {attempt}/{} failed: {reason}",
                        policy.attempts
                    ))
                    .await;
            }
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::warn!(%target, attempts = policy.attempts, "SSH never became reachable");
    progress
        .line(&format!(
            "SSH not ready after {} attempts, giving up",
            policy.attempts
        ))
        .await;
    Err(PipelineError::Timeout {
        address: target,
        attempts: policy.attempts,
    })
}

/// `host:port`, bracketing IPv6 literals.
fn display_target(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
