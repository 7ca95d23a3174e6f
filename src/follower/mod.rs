//! Follower: the client-side half of the leader/follower protocol.
//!
//! A [`Follower`] keeps one connection to the leader alive and drives it
//! through its lifecycle:
//!
//! ```text
//! Connecting ──► Registering ──► Ready
//!     ▲               │            │
//!     └── reconnect ◄─┴── close ◄──┘
//! ```
//!
//! 1. A supervisor task connects through the configured [`Connector`]
//! 2. `register_channel` is sent, retried every 5s until it succeeds
//! 3. On success every known topic is (re)subscribed and queued `invoke`s run
//! 4. Inbound `subscribe_result` pushes update the cache and notify listeners
//! 5. When the connection drops, the cycle starts over
//!
//! # Example
//!
//! ```ignore
//! let follower = Follower::builder("registry").connect_tcp("127.0.0.1:7777")?;
//!
//! follower.subscribe(json!({"dataId": "app"}), |value| println!("{value}"));
//! let hosts = follower.invoke("getHosts", vec![json!("app")]).await?;
//! ```

mod builder;
mod options;
mod reply;
mod subscriptions;

pub use builder::{default_format_key, FollowerBuilder};
pub use options::{
    Descriptor, FollowerOptions, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_DELAY,
    DEFAULT_RESPONSE_TIMEOUT,
};
pub use reply::{decode_packet, decode_reply, DecodedReply, Reply};
pub use subscriptions::{Listener, Registry};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::codec::Transcoder;
use crate::connection::{Connection, ConnectionEvent, ConnectionOptions, InboundRequest};
use crate::error::{ClusterError, Result};
use crate::protocol::{ConnObj, Frame, Packet, Request};
use crate::transport::Connector;
use subscriptions::Subscriptions;

/// Pause between two failed channel registrations.
pub const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Derives the cache key of a topic registration.
pub type KeyFormatter = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Lifecycle state of a follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    /// Waiting for a connection to the leader.
    Connecting,
    /// Connected, `register_channel` not yet acknowledged.
    Registering,
    /// Registered; calls flow.
    Ready,
    /// Shut down by [`Follower::close`].
    Closed,
}

struct Shared {
    options: FollowerOptions,
    transcoder: Arc<dyn Transcoder>,
    format_key: KeyFormatter,
    connector: Arc<dyn Connector>,
    publish_delegate: Option<String>,
    subscriptions: Subscriptions,
    state: watch::Sender<FollowerState>,
    connection: Mutex<Option<Connection>>,
    supervisor: Mutex<Option<AbortHandle>>,
    runtime: Handle,
}

/// Closes the follower when the last [`Follower`] handle is dropped.
///
/// Background tasks hold `Shared` only, never this.
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Handle to a running follower.
///
/// Cheaply cloneable. The background tasks run until [`Follower::close`] or
/// until every handle has been dropped.
#[derive(Clone)]
pub struct Follower {
    shared: Arc<Shared>,
    _owner: Arc<Owner>,
}

impl Follower {
    /// Create a new follower builder.
    pub fn builder(name: impl Into<String>) -> FollowerBuilder {
        FollowerBuilder::new(name)
    }

    fn start(
        options: FollowerOptions,
        transcoder: Arc<dyn Transcoder>,
        format_key: KeyFormatter,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let publish_delegate = options.find_delegate("publish").map(str::to_string);
        let (state, _) = watch::channel(FollowerState::Connecting);

        let shared = Arc::new(Shared {
            options,
            transcoder,
            format_key,
            connector,
            publish_delegate,
            subscriptions: Subscriptions::new(),
            state,
            connection: Mutex::new(None),
            supervisor: Mutex::new(None),
            runtime: Handle::current(),
        });

        let task = tokio::spawn(Arc::clone(&shared).supervise());
        *lock(&shared.supervisor) = Some(task.abort_handle());

        Self {
            _owner: Arc::new(Owner {
                shared: Arc::clone(&shared),
            }),
            shared,
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    /// Effective options.
    pub fn options(&self) -> &FollowerOptions {
        &self.shared.options
    }

    /// Always `false`; a follower never owns the shared resource.
    pub fn is_leader(&self) -> bool {
        false
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FollowerState {
        *self.shared.state.borrow()
    }

    /// Wait until the channel is registered.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the follower is closed first.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.shared.state.subscribe();
        let state = *rx
            .wait_for(|s| matches!(s, FollowerState::Ready | FollowerState::Closed))
            .await
            .map_err(|_| ClusterError::ConnectionClosed)?;
        match state {
            FollowerState::Ready => Ok(()),
            _ => Err(ClusterError::ConnectionClosed),
        }
    }

    /// Listen to a topic.
    ///
    /// The listener is always added. The upstream `subscribe` is sent only the
    /// first time a key is seen; later subscribers of a key that already has a
    /// value receive it immediately, without network traffic.
    pub fn subscribe<F>(&self, reg: Value, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let shared = &self.shared;
        let key = (shared.format_key)(&reg);
        let listener: Listener = Arc::new(listener);
        shared.subscriptions.add_listener(&key, listener.clone());

        // Checked under the registry lock so that the resubscribe step after
        // registration sees either the key or the Ready state, never neither.
        let (first, send_now, cached) = shared.subscriptions.with_registry(|registry| {
            let first = registry.insert(&key, &reg);
            let ready = *shared.state.borrow() == FollowerState::Ready;
            (first, first && ready, registry.cached(&key).cloned())
        });

        if first {
            tracing::info!(name = %shared.options.name, %reg, "subscribe for first time");
            if send_now {
                shared.send_subscribe(key, reg);
            }
        } else if let Some(value) = cached {
            tracing::info!(name = %shared.options.name, %reg, "subscribe");
            listener(&value);
        }
    }

    /// Publish through the method declared as the `publish` delegate.
    pub async fn publish(&self, reg: Value) -> Result<()> {
        let method = self
            .shared
            .publish_delegate
            .clone()
            .ok_or_else(|| ClusterError::MissingDelegate("publish".to_string()))?;
        self.invoke_oneway(method, vec![reg]).await
    }

    /// Call a leader method and wait for its result.
    ///
    /// Waits for [`FollowerState::Ready`] first.
    pub async fn invoke(&self, method: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        let conn = self.ready_connection().await?;
        let request = Request::new(
            ConnObj::Invoke {
                method: method.into(),
                args,
                oneway: false,
            },
            self.shared.options.response_timeout_ms(),
        );

        let reply = conn.call(request).await?;
        let transcoder = self.shared.transcoder.as_ref();
        decode_packet(transcoder, reply)?.into_value(transcoder)
    }

    /// Call a leader method without waiting for a result.
    ///
    /// Waits for [`FollowerState::Ready`] first.
    pub async fn invoke_oneway(&self, method: impl Into<String>, args: Vec<Value>) -> Result<()> {
        let conn = self.ready_connection().await?;
        let request = Request::new(
            ConnObj::Invoke {
                method: method.into(),
                args,
                oneway: true,
            },
            self.shared.options.response_timeout_ms(),
        );
        conn.send(&request).await
    }

    /// Encoded heartbeat request.
    pub fn heartbeat_packet(&self) -> Result<Vec<u8>> {
        heartbeat_request(self.shared.options.response_timeout_ms()).encode()
    }

    /// Decode a reply frame with this follower's transcoder.
    pub fn decode_reply(&self, frame: &Frame) -> Result<DecodedReply> {
        decode_reply(self.shared.transcoder.as_ref(), frame)
    }

    /// Last value pushed for a topic.
    pub fn cached(&self, reg: &Value) -> Option<Value> {
        self.shared.subscriptions.cached(&(self.shared.format_key)(reg))
    }

    /// Stop reconnecting and close the live connection.
    ///
    /// Pending calls fail with `ConnectionClosed`. Idempotent.
    pub fn close(&self) {
        self.shared.shutdown();
    }

    async fn ready_connection(&self) -> Result<Connection> {
        self.ready().await?;
        lock(&self.shared.connection)
            .clone()
            .ok_or(ClusterError::ConnectionClosed)
    }
}

impl std::fmt::Debug for Follower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Follower")
            .field("name", &self.shared.options.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn shutdown(&self) {
        let previous = self.state.send_replace(FollowerState::Closed);
        if previous == FollowerState::Closed {
            return;
        }

        if let Some(task) = lock(&self.supervisor).take() {
            task.abort();
        }
        if let Some(conn) = lock(&self.connection).take() {
            conn.close(None);
        }
        tracing::info!(name = %self.options.name, "follower closed");
    }

    /// Move to `next` unless the follower has been closed.
    fn set_state(&self, next: FollowerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == FollowerState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }

    fn is_closed(&self) -> bool {
        *self.state.borrow() == FollowerState::Closed
    }

    fn current_connection(&self) -> Option<Connection> {
        lock(&self.connection).clone()
    }

    async fn supervise(self: Arc<Self>) {
        loop {
            if self.is_closed() {
                return;
            }
            self.set_state(FollowerState::Connecting);

            let (stream, remote) = match self.connector.connect().await {
                Ok(connected) => connected,
                Err(e) => {
                    tracing::warn!(name = %self.options.name, "connect to leader failed: {}", e);
                    tokio::time::sleep(self.options.reconnect_delay).await;
                    continue;
                }
            };
            tracing::info!(name = %self.options.name, %remote, "connected to leader");

            let (conn, events) = Connection::new(
                stream,
                remote,
                ConnectionOptions {
                    max_body_size: self.options.max_body_size,
                    ..Default::default()
                },
            );
            *lock(&self.connection) = Some(conn.clone());

            if !self.set_state(FollowerState::Registering) {
                conn.close(None);
                return;
            }
            let registration = tokio::spawn(Arc::clone(&self).register_channel(conn.clone()));

            self.pump(&conn, events).await;

            registration.abort();
            self.set_state(FollowerState::Connecting);
            lock(&self.connection).take();
            tracing::warn!(name = %self.options.name, remote = %conn.remote(), "connection to leader lost");

            tokio::time::sleep(self.options.reconnect_delay).await;
        }
    }

    async fn pump(&self, conn: &Connection, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Request(req) => {
                    conn.set_last_active_time(Instant::now());
                    self.handle_request(req).await;
                }
                ConnectionEvent::Error(e) => {
                    tracing::warn!(name = %self.options.name, "connection error: {}", e);
                }
                ConnectionEvent::Close => break,
            }
        }
    }

    /// Register into the channel, retrying while `conn` stays alive, then
    /// keep it alive with heartbeats.
    async fn register_channel(self: Arc<Self>, conn: Connection) {
        loop {
            if conn.is_closed() {
                return;
            }

            match self.register_once(&conn).await {
                Ok(()) => break,
                Err(ClusterError::ConnectionClosed) => return,
                Err(e) => {
                    let err = ClusterError::RegistrationFailure {
                        channel: self.options.name.clone(),
                        source: Box::new(e),
                    };
                    tracing::warn!(
                        name = %self.options.name,
                        "{}, retry in {:?}",
                        err,
                        REGISTER_RETRY_DELAY
                    );
                    tokio::time::sleep(REGISTER_RETRY_DELAY).await;
                }
            }
        }

        tracing::info!(
            name = %self.options.name,
            "register to channel: {} success",
            self.options.name
        );
        self.on_registered(&conn).await;

        if let Some(interval) = self.options.heartbeat_interval {
            self.heartbeat(&conn, interval).await;
        }
    }

    async fn register_once(&self, conn: &Connection) -> Result<()> {
        let request = Request::new(
            ConnObj::RegisterChannel {
                channel_name: self.options.name.clone(),
            },
            self.options.response_timeout_ms(),
        );
        let reply = conn.call(request).await?;
        match decode_packet(self.transcoder.as_ref(), reply)?.reply {
            Reply::Error(e) => Err(e),
            _ => Ok(()),
        }
    }

    async fn on_registered(&self, conn: &Connection) {
        let topics = self.subscriptions.with_registry(|registry| {
            if self.set_state(FollowerState::Ready) {
                registry.topics()
            } else {
                Vec::new()
            }
        });

        for (key, reg) in topics {
            let request = subscribe_request(key, reg, self.options.response_timeout_ms());
            if let Err(e) = conn.send(&request).await {
                tracing::warn!(name = %self.options.name, "resubscribe failed: {}", e);
                return;
            }
        }
    }

    async fn heartbeat(&self, conn: &Connection, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match conn.call(heartbeat_request(self.options.response_timeout_ms())).await {
                Ok(_) => conn.set_last_active_time(Instant::now()),
                Err(ClusterError::ConnectionClosed) => return,
                Err(e) => {
                    tracing::warn!(name = %self.options.name, "heartbeat failed: {}", e);
                    conn.close(Some(e));
                    return;
                }
            }
        }
    }

    async fn handle_request(&self, req: InboundRequest) {
        let InboundRequest { packet, responder } = req;
        tracing::debug!(
            name = %self.options.name,
            id = packet.id,
            kind = packet.type_name(),
            "receive request from leader"
        );

        let key = match &packet.conn_obj {
            Some(ConnObj::SubscribeResult { key }) => key.clone(),
            _ => {
                tracing::debug!(kind = packet.type_name(), "ignoring control packet");
                return;
            }
        };

        let value = match packet.data.as_deref().map(|data| self.transcoder.decode(data)) {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                tracing::warn!(name = %self.options.name, %key, "undecodable subscribe_result: {}", e);
                return;
            }
            None => Value::Null,
        };

        for listener in self.subscriptions.update(&key, value.clone()) {
            listener(&value);
        }

        if let Err(e) = responder.respond(Some(ConnObj::SubscribeResultRes)).await {
            tracing::warn!(name = %self.options.name, %key, "subscribe_result ack failed: {}", e);
        }
    }

    fn send_subscribe(&self, key: String, reg: Value) {
        let Some(conn) = self.current_connection() else {
            return;
        };
        let request = subscribe_request(key, reg, self.options.response_timeout_ms());
        match conn.try_send(&request) {
            Ok(()) => {}
            // Writer queue full: wait for room rather than lose the subscribe.
            Err(ClusterError::BackpressureTimeout) => {
                let name = self.options.name.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = conn.send(&request).await {
                        tracing::warn!(%name, "subscribe send failed: {}", e);
                    }
                });
            }
            // A closed connection is covered by the resubscribe after reconnect.
            Err(e) => {
                tracing::warn!(name = %self.options.name, "subscribe send failed: {}", e);
            }
        }
    }
}

fn subscribe_request(key: String, reg: Value, timeout: u32) -> Packet {
    Request::new(ConnObj::Subscribe { key, reg }, timeout)
}

fn heartbeat_request(timeout: u32) -> Packet {
    Request::new(ConnObj::Heartbeat, timeout)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
