//! Per-machine "new log data available" signal.
//!
//! [`LogHub`] holds one wake generation per machine. A generation is a
//! [`CancellationToken`]: every [`WakeHandle`] taken from it resolves once
//! the generation is signalled, and a signalled generation is never reused.
//! [`LogHub::notify`] signals the current generation and installs a fresh
//! one in the same critical section, so a notify never wakes a handle taken
//! after it.
//!
//! The signal carries no data. Woken consumers re-read the log store from
//! their own cursor, which is also how a consumer that missed a notify
//! catches up.

use std::collections::HashMap;

use creator_core::types::DbId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle on one wake generation of one machine.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    token: CancellationToken,
}

impl WakeHandle {
    /// Resolve once the generation this handle belongs to is signalled.
    pub async fn signaled(&self) {
        self.token.cancelled().await;
    }

    /// Whether the generation has already been signalled.
    pub fn is_signaled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry of wake generations, one per machine.
///
/// Constructed once by the server and shared via `Arc<LogHub>`.
#[derive(Debug, Default)]
pub struct LogHub {
    generations: Mutex<HashMap<DbId, CancellationToken>>,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a handle signalled by the next [`notify`](Self::notify) for
    /// `machine_id`, creating the generation if none exists yet.
    pub async fn wait_channel(&self, machine_id: DbId) -> WakeHandle {
        let mut generations = self.generations.lock().await;
        let token = generations
            .entry(machine_id)
            .or_insert_with(CancellationToken::new)
            .clone();
        WakeHandle { token }
    }

    /// Wake every handle taken so far for `machine_id` and start a fresh
    /// generation for later waiters.
    ///
    /// A no-op when nobody has waited on the machine yet.
    pub async fn notify(&self, machine_id: DbId) {
        let mut generations = self.generations.lock().await;
        if let Some(current) = generations.get_mut(&machine_id) {
            let previous = std::mem::replace(current, CancellationToken::new());
            previous.cancel();
        }
    }

    /// Wake and discard the machine's generation. Used when the machine is
    /// deleted so blocked viewers unblock and exit.
    pub async fn remove(&self, machine_id: DbId) {
        let removed = self.generations.lock().await.remove(&machine_id);
        if let Some(token) = removed {
            token.cancel();
            tracing::debug!(machine_id, "Removed log hub channel");
        }
    }

    /// Number of machines with a live generation.
    pub async fn channel_count(&self) -> usize {
        self.generations.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn notify_wakes_all_current_waiters() {
        let hub = Arc::new(LogHub::new());
        let a = hub.wait_channel(1).await;
        let b = hub.wait_channel(1).await;

        let waiter = tokio::spawn(async move {
            a.signaled().await;
        });

        hub.notify(1).await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(b.is_signaled());
    }

    #[tokio::test]
    async fn notify_does_not_wake_later_waiters() {
        let hub = LogHub::new();
        let before = hub.wait_channel(1).await;

        hub.notify(1).await;
        let after = hub.wait_channel(1).await;

        assert!(before.is_signaled());
        assert!(!after.is_signaled());

        hub.notify(1).await;
        assert!(after.is_signaled());
    }

    #[tokio::test]
    async fn notify_is_scoped_to_one_machine() {
        let hub = LogHub::new();
        let one = hub.wait_channel(1).await;
        let two = hub.wait_channel(2).await;

        hub.notify(1).await;

        assert!(one.is_signaled());
        assert!(!two.is_signaled());
    }

    #[tokio::test]
    async fn notify_without_waiters_is_noop() {
        let hub = LogHub::new();
        hub.notify(7).await;
        assert_eq!(hub.channel_count().await, 0);

        let handle = hub.wait_channel(7).await;
        assert!(!handle.is_signaled());
    }

    #[tokio::test]
    async fn remove_wakes_and_discards() {
        let hub = LogHub::new();
        let handle = hub.wait_channel(3).await;
        assert_eq!(hub.channel_count().await, 1);

        hub.remove(3).await;

        assert!(handle.is_signaled());
        assert_eq!(hub.channel_count().await, 0);

        // A later wait starts a fresh, unsignalled generation.
        let fresh = hub.wait_channel(3).await;
        assert!(!fresh.is_signaled());
    }

    #[tokio::test]
    async fn waiter_blocks_until_notified() {
        let hub = LogHub::new();
        let handle = hub.wait_channel(5).await;

        let timed_out = tokio::time::timeout(Duration::from_millis(50), handle.signaled()).await;
        assert!(timed_out.is_err(), "no notify yet, wait should not resolve");
    }
}
