//! Outstanding-call table.
//!
//! Maps a request id to the sender that resolves its caller and the timer that
//! will fail it. Every resolution path (reply, timer, teardown) removes the
//! entry under the table lock before resolving, so each call sees exactly one
//! outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::{ClusterError, Result};
use crate::protocol::Packet;

/// Receiver side of a registered call.
pub type ReplyReceiver = oneshot::Receiver<Result<Packet>>;

struct PendingCall {
    reply: oneshot::Sender<Result<Packet>>,
    timer: AbortHandle,
}

#[derive(Default)]
struct Table {
    calls: HashMap<u64, PendingCall>,
    closed: bool,
}

/// Outstanding calls of one connection.
#[derive(Default)]
pub struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and start its timer.
    ///
    /// When the timer fires first, the caller receives
    /// `CallTimeout { remote, timeout_ms }` and the entry is gone.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once the table has been torn down.
    pub fn register(
        self: &Arc<Self>,
        id: u64,
        timeout: Duration,
        remote: &str,
    ) -> Result<ReplyReceiver> {
        let mut table = self.lock();
        if table.closed {
            return Err(ClusterError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();

        // The timer cannot observe the table before the entry is inserted: it
        // needs the lock we are holding.
        let this = Arc::clone(self);
        let remote = remote.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(call) = this.take(id) {
                tracing::debug!(id, remote = %remote, "call timed out");
                let _ = call.reply.send(Err(ClusterError::CallTimeout {
                    remote,
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        });

        table.calls.insert(
            id,
            PendingCall {
                reply: tx,
                timer: timer.abort_handle(),
            },
        );
        Ok(rx)
    }

    /// Resolve the call matching `packet.id` with the reply.
    ///
    /// Returns `false` when no call is waiting (already timed out or unknown id).
    pub fn resolve(&self, packet: Packet) -> bool {
        match self.take(packet.id) {
            Some(call) => {
                call.timer.abort();
                let _ = call.reply.send(Ok(packet));
                true
            }
            None => false,
        }
    }

    /// Drop a call without resolving it (its write failed).
    pub fn cancel(&self, id: u64) {
        if let Some(call) = self.take(id) {
            call.timer.abort();
        }
    }

    /// Reject every outstanding call with `ConnectionClosed` and refuse new ones.
    ///
    /// Returns how many calls were rejected.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<PendingCall> = {
            let mut table = self.lock();
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };

        let count = drained.len();
        for call in drained {
            call.timer.abort();
            let _ = call.reply.send(Err(ClusterError::ConnectionClosed));
        }
        count
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    /// Whether no call is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a call with this id is outstanding.
    pub fn contains(&self, id: u64) -> bool {
        self.lock().calls.contains_key(&id)
    }

    fn take(&self, id: u64) -> Option<PendingCall> {
        self.lock().calls.remove(&id)
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // A panic while holding this lock cannot leave the map half-updated.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
