//! Control metadata carried in the frame body.
//!
//! Every control packet carries a small JSON object whose `type` field selects
//! protocol-level behavior. Objects with an unrecognized, missing or
//! mismatched `type` decode to [`ConnObj::Unknown`] so newer leaders never
//! crash an older follower.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control metadata of a packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnObj {
    /// Liveness check.
    Heartbeat,
    /// Join the named channel on the leader.
    RegisterChannel {
        #[serde(rename = "channelName")]
        channel_name: String,
    },
    /// Upstream subscription for a topic.
    Subscribe { key: String, reg: Value },
    /// Leader pushes the latest value of a topic; the value is in the packet data.
    SubscribeResult { key: String },
    /// Delivery acknowledgement for a `subscribe_result`.
    SubscribeResultRes,
    /// Generic RPC towards the leader.
    Invoke {
        method: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        oneway: bool,
    },
    /// Outcome of an `invoke`; the result value (if any) is in the packet data.
    InvokeResult {
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    /// Any control type this follower does not know.
    #[serde(other)]
    Unknown,
}

impl ConnObj {
    /// Interpret a parsed metadata object.
    ///
    /// Any JSON value that does not fit a known control shape becomes
    /// `Unknown` instead of an error.
    pub fn from_json(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(obj) => obj,
            Err(e) => {
                tracing::debug!(error = %e, "unrecognized control metadata");
                ConnObj::Unknown
            }
        }
    }

    /// The wire name of the `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConnObj::Heartbeat => "heartbeat",
            ConnObj::RegisterChannel { .. } => "register_channel",
            ConnObj::Subscribe { .. } => "subscribe",
            ConnObj::SubscribeResult { .. } => "subscribe_result",
            ConnObj::SubscribeResultRes => "subscribe_result_res",
            ConnObj::Invoke { .. } => "invoke",
            ConnObj::InvokeResult { .. } => "invoke_result",
            ConnObj::Unknown => "unknown",
        }
    }
}
