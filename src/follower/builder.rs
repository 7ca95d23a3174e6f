//! Fluent configuration for a [`Follower`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::options::{Descriptor, FollowerOptions};
use super::{Follower, KeyFormatter};
use crate::codec::{MsgPackTranscoder, Transcoder};
use crate::error::{ClusterError, Result};
use crate::transport::{Connector, TcpConnector};

/// Builder for configuring and starting a follower.
///
/// ```ignore
/// let follower = Follower::builder("registry")
///     .response_timeout(Duration::from_secs(1))
///     .descriptor("publish", Descriptor::Delegate { to: "publish".into() })
///     .connect_tcp("127.0.0.1:7777")?;
///
/// follower.ready().await?;
/// ```
pub struct FollowerBuilder {
    pub(super) options: FollowerOptions,
    pub(super) transcoder: Arc<dyn Transcoder>,
    pub(super) format_key: KeyFormatter,
    pub(super) connector: Option<Arc<dyn Connector>>,
}

impl FollowerBuilder {
    /// Builder for a follower registering into `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_options(FollowerOptions {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Builder seeded with loaded options.
    pub fn from_options(options: FollowerOptions) -> Self {
        Self {
            options,
            transcoder: Arc::new(MsgPackTranscoder),
            format_key: Arc::new(default_format_key),
            connector: None,
        }
    }

    /// Timeout carried by every request.
    ///
    /// Default: 3 seconds
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.options.response_timeout = timeout;
        self
    }

    /// Pause between connection attempts.
    ///
    /// Default: 1 second
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    /// Heartbeat cadence, `None` to disable.
    ///
    /// Default: 5 seconds
    pub fn heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.options.heartbeat_interval = interval;
        self
    }

    /// Largest accepted frame body.
    ///
    /// Default: 64 MiB
    pub fn max_body_size(mut self, size: u32) -> Self {
        self.options.max_body_size = size;
        self
    }

    /// Declare a method descriptor.
    pub fn descriptor(mut self, method: impl Into<String>, descriptor: Descriptor) -> Self {
        self.options.descriptors.push((method.into(), descriptor));
        self
    }

    /// Payload transcoder.
    ///
    /// Default: [`MsgPackTranscoder`]
    pub fn transcoder(mut self, transcoder: impl Transcoder) -> Self {
        self.transcoder = Arc::new(transcoder);
        self
    }

    /// Topic key derivation.
    ///
    /// Default: compact JSON of the topic registration.
    pub fn format_key<F>(mut self, format_key: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.format_key = Arc::new(format_key);
        self
    }

    /// Where the leader is reached.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Start the follower. Must be called within a tokio runtime.
    ///
    /// Returns immediately; connection and registration proceed in the
    /// background. Await [`Follower::ready`] to wait for them.
    pub fn start(self) -> Result<Follower> {
        if self.options.name.is_empty() {
            return Err(ClusterError::Config("channel name is empty".to_string()));
        }
        let connector = self
            .connector
            .ok_or_else(|| ClusterError::Config("no connector configured".to_string()))?;
        Ok(Follower::start(
            self.options,
            self.transcoder,
            self.format_key,
            connector,
        ))
    }

    /// Start the follower against a leader at `addr` over TCP.
    pub fn connect_tcp(self, addr: impl Into<String>) -> Result<Follower> {
        self.connector(TcpConnector::new(addr)).start()
    }
}

/// Default topic key: the topic registration as compact JSON.
pub fn default_format_key(reg: &Value) -> String {
    reg.to_string()
}
