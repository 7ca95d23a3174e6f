//! Follower configuration.
//!
//! Options can be built in code through [`FollowerBuilder`](super::FollowerBuilder)
//! or loaded from a JSON document:
//!
//! ```
//! use cluster_follower::follower::{Descriptor, FollowerOptions};
//!
//! let options = FollowerOptions::from_json(r#"{
//!     "name": "registry",
//!     "responseTimeout": 1000,
//!     "heartbeatInterval": null,
//!     "descriptors": [["publish", {"type": "delegate", "to": "publish"}]]
//! }"#).unwrap();
//!
//! assert_eq!(options.find_delegate("publish"), Some("publish"));
//! assert!(options.heartbeat_interval.is_none());
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_BODY_SIZE;

/// Default reply timeout for every request the follower sends.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default pause between two connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How a client method maps onto the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Descriptor {
    Subscribe,
    Publish,
    Invoke,
    /// Forwards to another role, e.g. `{ "type": "delegate", "to": "publish" }`.
    Delegate { to: String },
}

/// Follower settings. Durations are milliseconds in JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FollowerOptions {
    /// Channel the follower registers into.
    pub name: String,
    /// Timeout carried by every request.
    #[serde(deserialize_with = "millis")]
    pub response_timeout: Duration,
    /// Pause before reconnecting after a failed connect or a lost connection.
    #[serde(deserialize_with = "millis")]
    pub reconnect_delay: Duration,
    /// Heartbeat cadence; `None` disables heartbeats.
    #[serde(deserialize_with = "optional_millis")]
    pub heartbeat_interval: Option<Duration>,
    /// Largest accepted frame body.
    pub max_body_size: u32,
    /// Method descriptors, in declaration order.
    pub descriptors: Vec<(String, Descriptor)>,
}

impl Default for FollowerOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            descriptors: Vec::new(),
        }
    }
}

impl FollowerOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// First method declared as a delegate to `role`.
    pub fn find_delegate(&self, role: &str) -> Option<&str> {
        self.descriptors.iter().find_map(|(method, descriptor)| match descriptor {
            Descriptor::Delegate { to } if to == role => Some(method.as_str()),
            _ => None,
        })
    }

    /// `response_timeout` as carried in the packet header.
    pub fn response_timeout_ms(&self) -> u32 {
        u32::try_from(self.response_timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let options = FollowerOptions::from_json("{}").unwrap();
        assert_eq!(options.name, "default");
        assert_eq!(options.response_timeout, DEFAULT_RESPONSE_TIMEOUT);
        assert_eq!(options.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(options.heartbeat_interval, Some(DEFAULT_HEARTBEAT_INTERVAL));
        assert_eq!(options.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert!(options.descriptors.is_empty());
    }

    #[test]
    fn test_durations_are_milliseconds() {
        let options = FollowerOptions::from_json(
            r#"{"responseTimeout": 250, "reconnectDelay": 10, "heartbeatInterval": 2000}"#,
        )
        .unwrap();
        assert_eq!(options.response_timeout, Duration::from_millis(250));
        assert_eq!(options.response_timeout_ms(), 250);
        assert_eq!(options.reconnect_delay, Duration::from_millis(10));
        assert_eq!(options.heartbeat_interval, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_first_matching_delegate_wins() {
        let options = FollowerOptions {
            descriptors: vec![
                ("subscribe".to_string(), Descriptor::Subscribe),
                (
                    "notify".to_string(),
                    Descriptor::Delegate {
                        to: "invoke".to_string(),
                    },
                ),
                (
                    "announce".to_string(),
                    Descriptor::Delegate {
                        to: "publish".to_string(),
                    },
                ),
                (
                    "announceAgain".to_string(),
                    Descriptor::Delegate {
                        to: "publish".to_string(),
                    },
                ),
            ],
            ..Default::default()
        };
        assert_eq!(options.find_delegate("publish"), Some("announce"));
        assert_eq!(options.find_delegate("invoke"), Some("notify"));
        assert_eq!(options.find_delegate("subscribe"), None);
    }

    #[test]
    fn test_unknown_descriptor_type_is_rejected() {
        let err = FollowerOptions::from_json(r#"{"descriptors": [["x", {"type": "teleport"}]]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let options = FollowerOptions {
            response_timeout: Duration::from_secs(u64::from(u32::MAX)),
            ..Default::default()
        };
        assert_eq!(options.response_timeout_ms(), u32::MAX);
    }
}
