//! Codec module - the pluggable payload transcoder.
//!
//! Packet metadata is always JSON; the `data` section of a packet is produced
//! and consumed by a [`Transcoder`] chosen per deployment:
//!
//! - [`MsgPackTranscoder`] - MessagePack using `rmp-serde` (default)
//! - [`JsonTranscoder`] - plain JSON, handy for debugging captures
//!
//! # Example
//!
//! ```
//! use cluster_follower::codec::{MsgPackTranscoder, Transcoder};
//! use serde_json::json;
//!
//! let codec = MsgPackTranscoder;
//! let bytes = codec.encode(&json!({"host": "10.0.0.1"})).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), json!({"host": "10.0.0.1"}));
//! ```

mod json;
mod msgpack;

pub use json::JsonTranscoder;
pub use msgpack::MsgPackTranscoder;

use serde_json::Value;

use crate::error::Result;

/// Serializes application payloads to bytes and back.
pub trait Transcoder: Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode bytes to a value.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}
