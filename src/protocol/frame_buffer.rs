//! Reassembly of frames from arbitrary socket reads.
//!
//! TCP gives no message boundaries. [`FrameBuffer`] accumulates bytes in a
//! `BytesMut` and cuts frames out of it in two steps: first the 24 header
//! bytes, then exactly `meta_length + data_length` body bytes. Lengths are
//! never read from a partial header, and a frame is never produced from a
//! partial body.
//!
//! ```
//! use cluster_follower::protocol::{ConnObj, FrameBuffer, Request};
//!
//! let bytes = Request::new(ConnObj::Heartbeat, 3000).encode().unwrap();
//! let (head, tail) = bytes.split_at(10);
//!
//! let mut frames = FrameBuffer::new();
//! assert!(frames.push(head).unwrap().is_empty());
//! assert_eq!(frames.push(tail).unwrap().len(), 1);
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// Incremental frame decoder for one inbound byte stream.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    /// Header whose body is still incomplete.
    pending: Option<Header>,
    max_body_size: u32,
}

impl FrameBuffer {
    /// Decoder accepting bodies up to the default 64 MiB.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Decoder accepting bodies up to `max_body_size` bytes.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE * 64),
            pending: None,
            max_body_size,
        }
    }

    /// Append a read and return every frame it completed, in arrival order.
    ///
    /// Trailing partial data stays buffered for the next call.
    ///
    /// # Errors
    ///
    /// `MalformedFrame` for an invalid header or an oversized body. The
    /// stream cannot be resynchronized after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut complete = Vec::new();
        while let Some(frame) = self.next_frame()? {
            complete.push(frame);
        }
        Ok(complete)
    }

    /// Append a read without decoding anything.
    ///
    /// Pair with [`next_frame`](Self::next_frame) to handle each frame before
    /// the next one is looked at.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Cut the next complete frame out of the buffered bytes, if any.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => match Header::decode(&self.buf)? {
                Some(header) => {
                    header.validate(self.max_body_size)?;
                    self.buf.advance(HEADER_SIZE);
                    header
                }
                None => return Ok(None),
            },
        };

        let body_length = header.body_length();
        if self.buf.len() < body_length {
            self.pending = Some(header);
            return Ok(None);
        }

        let body = self.buf.split_to(body_length).freeze();
        Ok(Some(Frame::new(header, body)))
    }

    /// Whether a header has been consumed and its body is still awaited.
    pub fn awaiting_body(&self) -> bool {
        self.pending.is_some()
    }

    /// Buffered bytes not yet part of an emitted frame (excluding a consumed header).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop buffered bytes and any half-read frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending = None;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use crate::protocol::build_frame;

    fn wire(id: u64, meta: &[u8], data: &[u8]) -> Vec<u8> {
        let header = Header::new(id, id % 2 == 0, 500, meta.len() as i32, data.len() as i32);
        build_frame(&header, meta, data)
    }

    #[test]
    fn test_whole_frame_in_one_read() {
        let mut frames = FrameBuffer::new();
        let out = frames.push(&wire(8, br#"{"type":"heartbeat"}"#, b"xyz")).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 8);
        assert!(out[0].is_response());
        assert_eq!(out[0].meta(), br#"{"type":"heartbeat"}"#);
        assert_eq!(out[0].data(), b"xyz");
        assert!(frames.is_empty());
        assert!(!frames.awaiting_body());
    }

    #[test]
    fn test_back_to_back_frames_keep_order() {
        let mut stream = wire(11, b"", b"a");
        stream.extend(wire(12, b"{}", b""));
        stream.extend(wire(13, b"{}", b"c"));

        let out = FrameBuffer::new().push(&stream).unwrap();

        assert_eq!(out.iter().map(Frame::id).collect::<Vec<_>>(), vec![11, 12, 13]);
    }

    #[test]
    fn test_partial_header_yields_nothing() {
        let bytes = wire(3, b"{}", b"body");
        let mut frames = FrameBuffer::new();

        assert!(frames.push(&bytes[..HEADER_SIZE - 1]).unwrap().is_empty());
        assert!(!frames.awaiting_body());
        assert_eq!(frames.len(), HEADER_SIZE - 1);

        let out = frames.push(&bytes[HEADER_SIZE - 1..]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data(), b"body");
    }

    #[test]
    fn test_partial_body_waits_for_rest() {
        let bytes = wire(4, br#"{"type":"subscribe_result","key":"k"}"#, b"pushed value");
        let mut frames = FrameBuffer::new();

        let cut = HEADER_SIZE + 9;
        assert!(frames.push(&bytes[..cut]).unwrap().is_empty());
        assert!(frames.awaiting_body());

        let out = frames.push(&bytes[cut..]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data(), b"pushed value");
        assert!(!frames.awaiting_body());
    }

    #[test]
    fn test_header_only_frame() {
        let out = FrameBuffer::new().push(&wire(6, b"", b"")).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].body.is_empty());
    }

    #[test]
    fn test_oversized_body_is_rejected_from_header_alone() {
        let mut frames = FrameBuffer::with_max_body(64);
        let header = Header::new(1, false, 0, 32, 33);

        assert!(matches!(
            frames.push(&header.encode()),
            Err(ClusterError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_frame_followed_by_fragment() {
        let first = wire(21, b"{}", b"one");
        let second = wire(22, b"{}", b"two");

        let mut read = first.clone();
        read.extend_from_slice(&second[..HEADER_SIZE + 1]);

        let mut frames = FrameBuffer::new();
        let out = frames.push(&read).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 21);
        assert!(frames.awaiting_body());

        let out = frames.push(&second[HEADER_SIZE + 1..]).unwrap();
        assert_eq!(out[0].id(), 22);
        assert_eq!(out[0].data(), b"two");
    }

    #[test]
    fn test_single_byte_reads_match_bulk_decode() {
        let bytes = wire(77, br#"{"k":1}"#, b"hi");
        let bulk = FrameBuffer::new().push(&bytes).unwrap();

        let mut frames = FrameBuffer::new();
        let trickled: Vec<Frame> = bytes
            .iter()
            .flat_map(|b| frames.push(std::slice::from_ref(b)).unwrap())
            .collect();

        assert_eq!(trickled.len(), 1);
        assert_eq!(trickled[0].header, bulk[0].header);
        assert_eq!(trickled[0].body, bulk[0].body);
    }

    #[test]
    fn test_next_frame_yields_good_frame_before_bad_header() {
        let mut read = wire(30, b"{}", b"ok");
        let mut bad = wire(31, b"", b"");
        bad[1] = 0xEE;
        read.extend_from_slice(&bad);

        let mut frames = FrameBuffer::new();
        frames.extend(&read);

        assert_eq!(frames.next_frame().unwrap().unwrap().id(), 30);
        assert!(matches!(
            frames.next_frame(),
            Err(ClusterError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_clear_discards_half_read_frame() {
        let bytes = wire(9, b"{}", b"abc");
        let mut frames = FrameBuffer::new();
        frames.push(&bytes[..HEADER_SIZE + 1]).unwrap();
        assert!(frames.awaiting_body());

        frames.clear();

        assert!(!frames.awaiting_body());
        assert!(frames.is_empty());
        assert_eq!(frames.push(&wire(10, b"", b"")).unwrap()[0].id(), 10);
    }
}
