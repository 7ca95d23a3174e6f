//! Connection: one socket, framing, and request/response correlation.
//!
//! A [`Connection`] owns both halves of a stream:
//! 1. A writer task serializes every outbound frame
//! 2. A read loop reassembles frames and routes them:
//!    - replies resolve the matching entry of the outstanding-call table
//!    - requests are posted as [`ConnectionEvent::Request`] with a [`Responder`]
//!
//! Requests are delivered through a channel, so handlers never run inside the
//! frame-extraction loop.
//!
//! # Example
//!
//! ```ignore
//! let (conn, mut events) = Connection::new(stream, "127.0.0.1:7777", ConnectionOptions::default());
//!
//! let reply = conn.call(Request::new(ConnObj::Heartbeat, 3000)).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ConnectionEvent::Request(req) => handle(req).await,
//!         ConnectionEvent::Error(err) => tracing::warn!(%err, "connection error"),
//!         ConnectionEvent::Close => break,
//!     }
//! }
//! ```

mod pending;
mod responder;

pub use pending::{PendingCalls, ReplyReceiver};
pub use responder::Responder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::{ClusterError, Result};
use crate::protocol::{Frame, FrameBuffer, Packet, DEFAULT_MAX_BODY_SIZE};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Size of a single socket read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Largest accepted frame body.
    pub max_body_size: u32,
    /// Capacity of the writer channel.
    pub channel_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A request received from the peer.
#[derive(Debug)]
pub struct InboundRequest {
    /// The decoded request.
    pub packet: Packet,
    /// Reply helper bound to the request's id and timeout.
    pub responder: Responder,
}

/// Events emitted by a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The peer sent a request.
    Request(InboundRequest),
    /// The connection is closing because of this error.
    Error(ClusterError),
    /// The connection is closed. Always the last event.
    Close,
}

struct Inner {
    remote: String,
    pending: Arc<PendingCalls>,
    writer: Mutex<Option<WriterHandle>>,
    events: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    tasks: Mutex<Vec<AbortHandle>>,
    closed: AtomicBool,
    last_active: Mutex<Instant>,
}

/// A framed, multiplexed connection to the leader.
///
/// Cheaply cloneable; all clones share the socket and the call table.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Take ownership of `stream` and start the reader and writer tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<S>(
        stream: S,
        remote: impl Into<String>,
        options: ConnectionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, options.channel_capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let conn = Self {
            inner: Arc::new(Inner {
                remote: remote.into(),
                pending: Arc::new(PendingCalls::new()),
                writer: Mutex::new(Some(writer)),
                events: Mutex::new(Some(events_tx)),
                tasks: Mutex::new(vec![writer_task.abort_handle()]),
                closed: AtomicBool::new(false),
                last_active: Mutex::new(Instant::now()),
            }),
        };

        let reader_conn = conn.clone();
        let read_task = tokio::spawn(async move {
            let result = reader_conn.read_loop(reader, options.max_body_size).await;
            match result {
                Ok(()) => reader_conn.close(None),
                Err(e) => {
                    tracing::error!(remote = %reader_conn.remote(), "Read loop error: {}", e);
                    reader_conn.close(Some(e));
                }
            }
        });

        if conn.is_closed() {
            read_task.abort();
        } else {
            lock(&conn.inner.tasks).push(read_task.abort_handle());
        }

        (conn, events_rx)
    }

    /// Peer identifier used in logs and timeout errors.
    pub fn remote(&self) -> &str {
        &self.inner.remote
    }

    /// Whether the socket is still live.
    pub fn is_ok(&self) -> bool {
        !self.is_closed() && lock(&self.inner.writer).as_ref().is_some_and(|w| !w.is_closed())
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Last activity stamp, maintained by the owner for idle detection.
    pub fn last_active_time(&self) -> Instant {
        *lock(&self.inner.last_active)
    }

    /// Update the activity stamp.
    pub fn set_last_active_time(&self, at: Instant) {
        *lock(&self.inner.last_active) = at;
    }

    /// Number of calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Write a packet without expecting a reply.
    ///
    /// Used for responses and oneway requests; no table entry is created.
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let frame = Bytes::from(packet.encode()?);
        self.writer()?.send(frame).await
    }

    /// Queue a packet without waiting for writer capacity.
    pub fn try_send(&self, packet: &Packet) -> Result<()> {
        let frame = Bytes::from(packet.encode()?);
        self.writer()?.try_send(frame)
    }

    /// Send a request and wait for its reply.
    ///
    /// Resolves exactly once: with the reply packet, with `CallTimeout` after
    /// `packet.timeout` ms, or with `ConnectionClosed` if the connection goes
    /// away first. A reply arriving after the timeout is dropped.
    pub async fn call(&self, packet: Packet) -> Result<Packet> {
        if packet.is_response {
            return Err(ClusterError::MalformedFrame(
                "a reply envelope cannot be sent as a call".to_string(),
            ));
        }

        let frame = Bytes::from(packet.encode()?);
        let writer = self.writer()?;
        let timeout = Duration::from_millis(u64::from(packet.timeout));
        let reply = self.inner.pending.register(packet.id, timeout, self.remote())?;

        if let Err(e) = writer.send(frame).await {
            self.inner.pending.cancel(packet.id);
            return Err(e);
        }

        reply.await.unwrap_or(Err(ClusterError::ConnectionClosed))
    }

    /// Tear the connection down.
    ///
    /// Idempotent: only the first call has any effect. Stops both socket tasks,
    /// rejects outstanding calls with `ConnectionClosed`, emits
    /// `ConnectionEvent::Error` when `err` is given, then `ConnectionEvent::Close`,
    /// and finally drops the event sender.
    pub fn close(&self, err: Option<ClusterError>) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        lock(&self.inner.writer).take();

        let rejected = self.inner.pending.reject_all();
        if rejected > 0 {
            tracing::debug!(remote = %self.remote(), rejected, "rejected pending calls on close");
        }

        if let Some(events) = lock(&self.inner.events).take() {
            if let Some(err) = err {
                let _ = events.send(ConnectionEvent::Error(err));
            }
            let _ = events.send(ConnectionEvent::Close);
        }
    }

    fn writer(&self) -> Result<WriterHandle> {
        lock(&self.inner.writer)
            .clone()
            .ok_or(ClusterError::ConnectionClosed)
    }

    async fn read_loop<R>(&self, mut reader: R, max_body_size: u32) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FrameBuffer::with_max_body(max_body_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }

            // Each frame is handled before the next header is decoded, so a bad
            // frame never discards the good ones ahead of it.
            frames.extend(&buf[..n]);
            while let Some(frame) = frames.next_frame()? {
                self.process_frame(frame)?;
            }
        }
    }

    fn process_frame(&self, frame: Frame) -> Result<()> {
        let packet = Packet::from_frame(&frame)?;

        if packet.is_response {
            let id = packet.id;
            if !self.inner.pending.resolve(packet) {
                tracing::debug!(id, remote = %self.remote(), "dropping reply with no pending call");
            }
            return Ok(());
        }

        let responder = match lock(&self.inner.writer).clone() {
            Some(writer) => Responder::with_writer(packet.id, packet.timeout, writer),
            None => Responder::detached(packet.id, packet.timeout),
        };
        if let Some(events) = lock(&self.inner.events).as_ref() {
            let _ = events.send(ConnectionEvent::Request(InboundRequest { packet, responder }));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.inner.remote)
            .field("closed", &self.is_closed())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
