//! Mapping leader replies onto call outcomes.

use bytes::Bytes;
use serde_json::Value;

use crate::codec::Transcoder;
use crate::error::{ClusterError, Result};
use crate::protocol::{ConnObj, Frame, Packet};

/// Outcome carried by a reply.
#[derive(Debug)]
pub enum Reply {
    /// `invoke_result` with `success = true`; the decoded payload, if any.
    Data(Option<Value>),
    /// `invoke_result` with `success = false`, as a `RemoteInvoke` error.
    Error(ClusterError),
    /// Any other reply, passed through untouched.
    Raw {
        conn_obj: Option<ConnObj>,
        data: Option<Bytes>,
    },
}

/// A reply together with its correlation fields.
#[derive(Debug)]
pub struct DecodedReply {
    pub id: u64,
    pub is_response: bool,
    pub reply: Reply,
}

impl DecodedReply {
    /// Collapse into the value an `invoke` caller receives.
    ///
    /// Raw replies yield their decoded data, or `Null` when empty.
    pub fn into_value(self, transcoder: &dyn Transcoder) -> Result<Value> {
        match self.reply {
            Reply::Data(value) => Ok(value.unwrap_or(Value::Null)),
            Reply::Error(err) => Err(err),
            Reply::Raw { data: Some(data), .. } => transcoder.decode(&data),
            Reply::Raw { data: None, .. } => Ok(Value::Null),
        }
    }
}

/// Decode a received frame.
pub fn decode_reply(transcoder: &dyn Transcoder, frame: &Frame) -> Result<DecodedReply> {
    decode_packet(transcoder, Packet::from_frame(frame)?)
}

/// Decode an already parsed packet.
pub fn decode_packet(transcoder: &dyn Transcoder, packet: Packet) -> Result<DecodedReply> {
    let reply = match packet.conn_obj {
        Some(ConnObj::InvokeResult { success: true, .. }) => Reply::Data(
            packet
                .data
                .as_deref()
                .map(|data| transcoder.decode(data))
                .transpose()?,
        ),
        Some(ConnObj::InvokeResult {
            success: false,
            message,
            stack,
        }) => Reply::Error(ClusterError::RemoteInvoke {
            message: message.unwrap_or_default(),
            stack,
        }),
        conn_obj => Reply::Raw {
            conn_obj,
            data: packet.data,
        },
    };

    Ok(DecodedReply {
        id: packet.id,
        is_response: packet.is_response,
        reply,
    })
}
