//! Error types for cluster-follower.

use thiserror::Error;

/// Main error type for all follower and connection operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (packet metadata, JSON transcoder).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Header and body are inconsistent or undecodable. Fatal to the connection.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// No reply arrived within the call's declared timeout.
    #[error("[ClusterClient] no response in {timeout_ms}ms, remote#{remote}")]
    CallTimeout {
        /// Peer the call was sent to.
        remote: String,
        /// Timeout the call carried.
        timeout_ms: u64,
    },

    /// The leader reported `invoke_result.success = false`.
    #[error("{message}")]
    RemoteInvoke {
        /// Message reported by the leader.
        message: String,
        /// Remote stack text, if the leader sent one.
        stack: Option<String>,
    },

    /// Channel registration failed or timed out. Logged and retried, never terminal.
    #[error("register to channel {channel} failed: {source}")]
    RegistrationFailure {
        /// Channel the follower tried to join.
        channel: String,
        /// Underlying call error.
        #[source]
        source: Box<ClusterError>,
    },

    /// Connection closed before the operation could complete.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Writer queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// No descriptor declares a delegate for the given role.
    #[error("No method is declared as the {0} delegate")]
    MissingDelegate(String),

    /// Invalid follower configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClusterError {
    /// Whether this error only concerns a single call (the connection stays usable).
    pub fn is_call_scoped(&self) -> bool {
        matches!(
            self,
            ClusterError::CallTimeout { .. } | ClusterError::RemoteInvoke { .. }
        )
    }
}

/// Result type alias using ClusterError.
pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_remote_and_duration() {
        let err = ClusterError::CallTimeout {
            remote: "127.0.0.1:7777".to_string(),
            timeout_ms: 3000,
        };
        assert_eq!(
            err.to_string(),
            "[ClusterClient] no response in 3000ms, remote#127.0.0.1:7777"
        );
        assert!(err.is_call_scoped());
    }

    #[test]
    fn test_registration_failure_keeps_source() {
        let err = ClusterError::RegistrationFailure {
            channel: "app".to_string(),
            source: Box::new(ClusterError::ConnectionClosed),
        };
        assert!(err.to_string().contains("app"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_call_scoped());
    }
}
