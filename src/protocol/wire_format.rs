//! Wire format encoding and decoding.
//!
//! Implements the 24-byte header format:
//! ```text
//! ┌─────────┬──────┬──────────┬──────────┬──────────┬───────────┬───────────┐
//! │ Version │ Kind │ Reserved │ Id       │ Timeout  │ Meta len  │ Data len  │
//! │ 1 byte  │1 byte│ 2 bytes  │ 8 bytes  │ 4 bytes  │ 4 bytes   │ 4 bytes   │
//! │         │      │          │ uint64 BE│ uint32 BE│ int32 BE  │ int32 BE  │
//! └─────────┴──────┴──────────┴──────────┴──────────┴───────────┴───────────┘
//! ```
//!
//! The body that follows is exactly `meta_length + data_length` bytes.

use crate::error::{ClusterError, Result};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// Protocol version written into every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default maximum body size (64 MiB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Packet kind byte: call envelope.
pub const KIND_REQUEST: u8 = 0;

/// Packet kind byte: reply envelope.
pub const KIND_RESPONSE: u8 = 1;

const META_LENGTH_OFFSET: usize = 16;
const DATA_LENGTH_OFFSET: usize = 20;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Reply envelope (true) or call envelope (false).
    pub is_response: bool,
    /// Correlation id.
    pub id: u64,
    /// Milliseconds the sender waits for a reply.
    pub timeout: u32,
    /// Length of the serialized control metadata.
    pub meta_length: i32,
    /// Length of the application payload.
    pub data_length: i32,
}

impl Header {
    /// Create a new header for the current protocol version.
    pub fn new(id: u64, is_response: bool, timeout: u32, meta_length: i32, data_length: i32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            is_response,
            id,
            timeout,
            meta_length,
            data_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use cluster_follower::protocol::Header;
    ///
    /// let header = Header::new(42, false, 3000, 10, 5);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 24);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = if self.is_response {
            KIND_RESPONSE
        } else {
            KIND_REQUEST
        };
        buf[4..12].copy_from_slice(&self.id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.timeout.to_be_bytes());
        buf[META_LENGTH_OFFSET..DATA_LENGTH_OFFSET].copy_from_slice(&self.meta_length.to_be_bytes());
        buf[DATA_LENGTH_OFFSET..HEADER_SIZE].copy_from_slice(&self.data_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `Ok(None)` if fewer than `HEADER_SIZE` bytes are available,
    /// and `MalformedFrame` for a foreign version, an unknown packet kind or
    /// negative lengths.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        if buf[0] != PROTOCOL_VERSION {
            return Err(ClusterError::MalformedFrame(format!(
                "unsupported protocol version {}",
                buf[0]
            )));
        }

        let is_response = match buf[1] {
            KIND_REQUEST => false,
            KIND_RESPONSE => true,
            other => {
                return Err(ClusterError::MalformedFrame(format!(
                    "unknown packet kind {}",
                    other
                )))
            }
        };

        let header = Self {
            version: PROTOCOL_VERSION,
            is_response,
            id: u64::from_be_bytes(read_array(&buf[4..12])),
            timeout: u32::from_be_bytes(read_array(&buf[12..16])),
            meta_length: read_i32(buf, META_LENGTH_OFFSET),
            data_length: read_i32(buf, DATA_LENGTH_OFFSET),
        };

        if header.meta_length < 0 || header.data_length < 0 {
            return Err(ClusterError::MalformedFrame(format!(
                "negative length (meta {}, data {})",
                header.meta_length, header.data_length
            )));
        }

        Ok(Some(header))
    }

    /// Total body length following the header.
    #[inline]
    pub fn body_length(&self) -> usize {
        self.meta_length.max(0) as usize + self.data_length.max(0) as usize
    }

    /// Reject bodies larger than `max_body_size`.
    pub fn validate(&self, max_body_size: u32) -> Result<()> {
        if self.body_length() > max_body_size as usize {
            return Err(ClusterError::MalformedFrame(format!(
                "body size {} exceeds maximum {}",
                self.body_length(),
                max_body_size
            )));
        }
        Ok(())
    }
}

/// Body length declared by a raw header: the sum of the int32 fields at offsets 16 and 20.
///
/// Returns `None` until a full header is available.
pub fn body_length_of(header: &[u8]) -> Option<i64> {
    if header.len() < HEADER_SIZE {
        return None;
    }
    Some(read_i32(header, META_LENGTH_OFFSET) as i64 + read_i32(header, DATA_LENGTH_OFFSET) as i64)
}

#[inline]
fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes(read_array(&buf[offset..offset + 4]))
}

#[inline]
fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(0x0102_0304_0506_0708, true, 5000, 17, 3);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap().unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_layout() {
        let header = Header::new(0x0A0B, false, 0x0102_0304, 0x10, 0x20);
        let bytes = header.encode();

        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], KIND_REQUEST);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..12], &[0, 0, 0, 0, 0, 0, 0x0A, 0x0B]);
        assert_eq!(&bytes[12..16], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0x10]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 0x20]);
    }

    #[test]
    fn test_body_length_is_sum_of_fixed_offsets() {
        let bytes = Header::new(1, false, 0, 100, 28).encode();
        assert_eq!(body_length_of(&bytes), Some(128));
        assert_eq!(body_length_of(&bytes[..23]), None);
        assert_eq!(Header::decode(&bytes).unwrap().unwrap().body_length(), 128);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let mut bytes = Header::new(1, false, 0, 0, 0).encode();
        bytes[1] = 7;
        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown packet kind"));
    }

    #[test]
    fn test_decode_rejects_foreign_version() {
        let mut bytes = Header::new(1, false, 0, 0, 0).encode();
        bytes[0] = PROTOCOL_VERSION + 1;
        let err = Header::decode(&bytes).unwrap_err();
        assert!(matches!(err, ClusterError::MalformedFrame(_)));
        assert!(err.to_string().contains("unsupported protocol version"));
    }

    #[test]
    fn test_decode_rejects_negative_length() {
        let bytes = Header::new(1, false, 0, -1, 4).encode();
        assert!(matches!(
            Header::decode(&bytes),
            Err(ClusterError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_validate_body_too_large() {
        let header = Header::new(1, false, 0, 60, 60);
        assert!(header.validate(120).is_ok());
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }
}
