//! Transport module - how the follower reaches its leader.
//!
//! The follower never opens sockets itself. It asks a [`Connector`] for a
//! fresh byte stream on every (re)connect, which keeps the supervisor testable
//! with in-memory pipes:
//! - [`TcpConnector`] - plain TCP with `TCP_NODELAY` (production)
//! - any custom `Connector` (duplex streams in tests, TLS wrappers, ...)

mod tcp;

pub use tcp::TcpConnector;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Boxed future returned by [`Connector::connect`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased stream handed to the connection.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens a new stream to the leader.
pub trait Connector: Send + Sync + 'static {
    /// Connect and return the stream plus the peer key used in logs and
    /// timeout errors.
    fn connect(&self) -> BoxFuture<'static, Result<(BoxedStream, String)>>;
}
