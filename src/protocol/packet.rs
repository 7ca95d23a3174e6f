//! Packet: the wire unit, and its two roles.
//!
//! [`Request`] builds call envelopes with a fresh id, [`Response`] builds reply
//! envelopes that reuse the id of the request they answer.
//!
//! # Example
//!
//! ```
//! use cluster_follower::protocol::{ConnObj, Packet, Request};
//!
//! let req = Request::new(ConnObj::Heartbeat, 3000);
//! let decoded = Packet::decode(&req.encode().unwrap()).unwrap();
//! assert_eq!(decoded, req);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::control::ConnObj;
use super::frame::{build_frame, Frame};
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{ClusterError, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique packet id.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Correlation id.
    pub id: u64,
    /// Reply envelope (true) or call envelope (false).
    pub is_response: bool,
    /// Milliseconds the sender waits for a reply. Ignored on replies.
    pub timeout: u32,
    /// Control metadata.
    pub conn_obj: Option<ConnObj>,
    /// Opaque payload produced by the transcoder.
    pub data: Option<Bytes>,
}

impl Packet {
    /// Attach a payload.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        self.data = if data.is_empty() { None } else { Some(data) };
        self
    }

    /// Encode into a single contiguous frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let meta = match &self.conn_obj {
            Some(obj) => serde_json::to_vec(obj)?,
            None => Vec::new(),
        };
        let data: &[u8] = self.data.as_deref().unwrap_or_default();

        let header = Header::new(
            self.id,
            self.is_response,
            self.timeout,
            section_length(meta.len())?,
            section_length(data.len())?,
        );
        Ok(build_frame(&header, &meta, data))
    }

    /// Decode a packet from a buffer holding at least one full frame.
    ///
    /// # Errors
    ///
    /// `MalformedFrame` if the buffer is shorter than the declared lengths or
    /// the metadata is not JSON. JSON of an unknown shape decodes to
    /// [`ConnObj::Unknown`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = Header::decode(buf)?.ok_or_else(|| {
            ClusterError::MalformedFrame(format!(
                "need {} header bytes, got {}",
                HEADER_SIZE,
                buf.len()
            ))
        })?;

        let available = buf.len() - HEADER_SIZE;
        if header.body_length() > available {
            return Err(ClusterError::MalformedFrame(format!(
                "declared body length {} exceeds available {} bytes",
                header.body_length(),
                available
            )));
        }

        let body = Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + header.body_length()]);
        Self::from_frame(&Frame::new(header, body))
    }

    /// Decode a packet from a separated header/body pair.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.body.len() < frame.header.body_length() {
            return Err(ClusterError::MalformedFrame(format!(
                "body has {} bytes, header declares {}",
                frame.body.len(),
                frame.header.body_length()
            )));
        }

        let meta = frame.meta();
        let conn_obj = if meta.is_empty() {
            None
        } else {
            let value = serde_json::from_slice(meta).map_err(|e| {
                ClusterError::MalformedFrame(format!("metadata is not JSON: {}", e))
            })?;
            Some(ConnObj::from_json(value))
        };

        let data = frame.data_bytes();
        Ok(Self {
            id: frame.header.id,
            is_response: frame.header.is_response,
            timeout: frame.header.timeout,
            conn_obj,
            data: if data.is_empty() { None } else { Some(data) },
        })
    }

    /// Control type name, if any, for logging.
    pub fn type_name(&self) -> &'static str {
        self.conn_obj.as_ref().map_or("none", ConnObj::type_name)
    }
}

fn section_length(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| ClusterError::MalformedFrame(format!("section of {} bytes is too large", len)))
}

/// Outbound call envelope.
pub struct Request;

impl Request {
    /// Build a request with a freshly allocated id.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(conn_obj: ConnObj, timeout: u32) -> Packet {
        Packet {
            id: next_id(),
            is_response: false,
            timeout,
            conn_obj: Some(conn_obj),
            data: None,
        }
    }
}

/// Reply envelope bound to the id of the request it answers.
pub struct Response;

impl Response {
    /// Build a response reusing `id` so the peer's pending entry resolves.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(id: u64, timeout: u32, conn_obj: Option<ConnObj>) -> Packet {
        Packet {
            id,
            is_response: true,
            timeout,
            conn_obj,
            data: None,
        }
    }
}
