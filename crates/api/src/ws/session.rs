//! One viewer's log stream.
//!
//! Protocol, server to viewer:
//!
//! 1. `init` with the machine snapshot.
//! 2. `log` for every stored entry, oldest first.
//! 3. `log` for each entry appended while connected.
//! 4. `status` once the machine is terminal, then close.
//!
//! Viewer frames are read only to notice the viewer leaving. Each session
//! keeps its own cursor, so a slow viewer never holds back another one.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use creator_core::stream_messages::{MachineSnapshot, StreamMessage};
use creator_core::types::DbId;
use creator_events::LogHub;
use creator_pipeline::{ProvisionStore, StoreError};

/// Ping period, under the common 60s idle timeout of proxies.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(54);

type WsSink = SplitSink<WebSocket, Message>;

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("send failed: {0}")]
    Send(#[from] axum::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Terminal,
    MachineGone,
    ViewerLeft,
    Shutdown,
}

pub(crate) struct LogSession {
    machine_id: DbId,
    store: Arc<dyn ProvisionStore>,
    hub: Arc<LogHub>,
    shutdown: CancellationToken,
}

impl LogSession {
    pub(crate) fn new(
        machine_id: DbId,
        store: Arc<dyn ProvisionStore>,
        hub: Arc<LogHub>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            machine_id,
            store,
            hub,
            shutdown,
        }
    }

    /// Drive the session until it ends, then close the socket.
    pub(crate) async fn run(self, socket: WebSocket, init: MachineSnapshot) {
        let session_id = uuid::Uuid::new_v4();
        let machine_id = self.machine_id;
        tracing::info!(%session_id, machine_id, "Log viewer connected");

        let (mut sink, mut stream) = socket.split();

        // Reader task: only watches for the viewer going away.
        let disconnected = CancellationToken::new();
        let reader = tokio::spawn({
            let disconnected = disconnected.clone();
            async move {
                while let Some(result) = stream.next().await {
                    match result {
                        Ok(Message::Close(_)) => break,
                        Ok(Message::Pong(_)) => {
                            tracing::trace!(%session_id, "Pong received");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(%session_id, error = %e, "WebSocket receive error");
                            break;
                        }
                    }
                }
                disconnected.cancel();
            }
        });

        match self.stream(&mut sink, init, &disconnected).await {
            Ok(end) => {
                tracing::info!(%session_id, machine_id, ?end, "Log viewer session ended");
            }
            Err(e) => {
                tracing::debug!(%session_id, machine_id, error = %e, "Log viewer session aborted");
            }
        }

        let _ = sink.send(Message::Close(None)).await;
        reader.abort();
    }

    async fn stream(
        &self,
        sink: &mut WsSink,
        init: MachineSnapshot,
        disconnected: &CancellationToken,
    ) -> Result<SessionEnd, SessionError> {
        send(sink, &StreamMessage::Init { machine: init }).await?;

        let mut last_id: DbId = 0;
        let mut keepalive = interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Take the handle before reading so an append landing between
            // the read and the wait still wakes us.
            let wake = self.hub.wait_channel(self.machine_id).await;

            // Status before entries: the terminal status is written after
            // the run's last line, so a terminal snapshot means the forward
            // below already covers every line of the run.
            let Some(current) = self.store.snapshot(self.machine_id).await? else {
                self.hub.remove(self.machine_id).await;
                return Ok(SessionEnd::MachineGone);
            };

            last_id = self.forward_after(sink, last_id).await?;

            if current.status.is_terminal() {
                let status = StreamMessage::Status {
                    status: current.status,
                    credential_removed: current.credential_removed,
                };
                send(sink, &status).await?;
                return Ok(SessionEnd::Terminal);
            }

            tokio::select! {
                () = wake.signaled() => {}
                _ = keepalive.tick() => {
                    sink.send(Message::Ping(Bytes::new())).await?;
                }
                () = disconnected.cancelled() => return Ok(SessionEnd::ViewerLeft),
                () = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            }
        }
    }

    /// Send every entry after `after_id` and return the new cursor.
    async fn forward_after(&self, sink: &mut WsSink, after_id: DbId) -> Result<DbId, SessionError> {
        let entries = self.store.entries_after(self.machine_id, after_id).await?;
        let mut last_id = after_id;
        for entry in entries {
            send(sink, &StreamMessage::Log { line: entry.line }).await?;
            last_id = entry.id;
        }
        Ok(last_id)
    }
}

async fn send(sink: &mut WsSink, message: &StreamMessage) -> Result<(), SessionError> {
    let text = message.to_json()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
