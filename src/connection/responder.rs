//! Reply helper handed out with every inbound request.
//!
//! A [`Responder`] is pre-bound to the id and timeout of the request it came
//! with, so a handler can answer without re-deriving correlation data.
//!
//! # Example
//!
//! ```ignore
//! while let Some(ConnectionEvent::Request(req)) = events.recv().await {
//!     req.responder.respond(Some(ConnObj::SubscribeResultRes)).await?;
//! }
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{ConnObj, Packet, Response};
use crate::writer::WriterHandle;

/// Context for replying to one inbound request.
///
/// `Responder` is `Clone` and can be moved into other tasks.
#[derive(Clone, Debug)]
pub struct Responder {
    id: u64,
    timeout: u32,
    writer: Option<WriterHandle>,
}

impl Responder {
    /// Create a responder without a writer (replies are discarded).
    pub fn detached(id: u64, timeout: u32) -> Self {
        Self {
            id,
            timeout,
            writer: None,
        }
    }

    /// Create a responder writing to the given connection writer.
    pub fn with_writer(id: u64, timeout: u32, writer: WriterHandle) -> Self {
        Self {
            id,
            timeout,
            writer: Some(writer),
        }
    }

    /// Id of the request this responder answers.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Timeout carried by the request.
    #[inline]
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// The reply packet this responder would send.
    pub fn packet(&self, conn_obj: Option<ConnObj>) -> Packet {
        Response::new(self.id, self.timeout, conn_obj)
    }

    /// Send a reply with control metadata only.
    pub async fn respond(&self, conn_obj: Option<ConnObj>) -> Result<()> {
        self.send(self.packet(conn_obj)).await
    }

    /// Send a reply with control metadata and a transcoded payload.
    pub async fn respond_with_data(&self, conn_obj: Option<ConnObj>, data: Bytes) -> Result<()> {
        self.send(self.packet(conn_obj).with_data(data)).await
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        let writer = match &self.writer {
            Some(w) => w,
            None => return Ok(()),
        };
        writer.send(Bytes::from(packet.encode()?)).await
    }
}
