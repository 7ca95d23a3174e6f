//! Dedicated writer task that owns the write half of the socket.
//!
//! Every outbound frame goes through one mpsc channel into a single task, so
//! frames from concurrent callers are never interleaved on the wire.
//!
//! ```text
//! Follower::invoke ─┐
//! Responder        ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Socket
//! Heartbeat        ─┘
//! ```
//!
//! The task drains whatever is queued after the first frame (up to
//! `MAX_BATCH_SIZE`) and flushes once per batch.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ClusterError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames written between two flushes.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending encoded frames to the writer task.
///
/// Cheaply cloneable. Once every handle is dropped the writer task flushes
/// and shuts the socket down.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue an encoded frame, waiting for channel capacity.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ClusterError::ConnectionClosed)
    }

    /// Queue an encoded frame without waiting.
    ///
    /// Returns `BackpressureTimeout` when the channel is full.
    pub fn try_send(&self, frame: Bytes) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClusterError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => ClusterError::ConnectionClosed,
        })
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        for frame in batch.drain(..) {
            writer.write_all(&frame).await?;
        }
        writer.flush().await?;
    }

    // All handles dropped: the connection is closing.
    let _ = writer.shutdown().await;
    Ok(())
}
