//! Protocol module - wire format, framing, control metadata and packets.
//!
//! This module implements the binary protocol spoken with the leader:
//! - 24-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Tagged control metadata (`connObj`)
//! - Packet codec with request/response roles

mod control;
mod frame;
mod frame_buffer;
mod packet;
mod wire_format;

pub use control::ConnObj;
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use packet::{next_id, Packet, Request, Response};
pub use wire_format::{
    body_length_of, Header, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE, KIND_REQUEST, KIND_RESPONSE,
    PROTOCOL_VERSION,
};
