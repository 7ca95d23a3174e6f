//! Frame struct: one header plus its complete body.
//!
//! Uses `bytes::Bytes` so the metadata and data sections are zero-copy
//! slices of the body.
//!
//! # Example
//!
//! ```
//! use cluster_follower::protocol::{Frame, Header};
//! use bytes::Bytes;
//!
//! let header = Header::new(7, false, 1000, 2, 3);
//! let frame = Frame::new(header, Bytes::from_static(b"{}abc"));
//!
//! assert_eq!(frame.meta(), b"{}");
//! assert_eq!(frame.data(), b"abc");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes: metadata followed by data.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Serialized control metadata section.
    #[inline]
    pub fn meta(&self) -> &[u8] {
        &self.body[..self.meta_len()]
    }

    /// Application payload section.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.body[self.meta_len()..]
    }

    /// Payload section as `Bytes` (cheap, zero-copy).
    #[inline]
    pub fn data_bytes(&self) -> Bytes {
        self.body.slice(self.meta_len()..)
    }

    /// Correlation id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.header.id
    }

    /// Check if this is a reply envelope.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response
    }

    #[inline]
    fn meta_len(&self) -> usize {
        (self.header.meta_length.max(0) as usize).min(self.body.len())
    }
}

/// Build a complete frame as a single byte vector.
pub fn build_frame(header: &Header, meta: &[u8], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + meta.len() + data.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(meta);
    buf.extend_from_slice(data);
    buf
}
