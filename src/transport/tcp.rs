//! TCP connector.

use tokio::net::TcpStream;

use super::{BoxFuture, BoxedStream, Connector};
use crate::error::Result;

/// Connects to the leader over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Connector for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> BoxFuture<'static, Result<(BoxedStream, String)>> {
        let addr = self.addr.clone();
        Box::pin(async move {
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true)?;
            let remote = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or(addr);
            Ok((Box::new(stream) as BoxedStream, remote))
        })
    }
}
