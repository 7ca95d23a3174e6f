//! # cluster-follower
//!
//! Follower-side transport for a leader/follower cluster.
//!
//! Many local processes share one logical owner of a resource (the leader)
//! through a single multiplexed TCP connection. The follower exposes
//! subscribe / publish / invoke to its callers; the wire protocol handles
//! correlation, timeouts and control traffic.
//!
//! ## Architecture
//!
//! - **Protocol**: 24-byte big-endian header, JSON control metadata, opaque data
//! - **Connection**: framing, outstanding-call table, per-call timers
//! - **Follower**: registration with retry, subscription cache and replay,
//!   invoke dispatch, reconnect and heartbeat
//!
//! ## Example
//!
//! ```ignore
//! use cluster_follower::Follower;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> cluster_follower::Result<()> {
//!     let follower = Follower::builder("registry").connect_tcp("127.0.0.1:7777")?;
//!
//!     follower.subscribe(json!({"dataId": "app"}), |value| {
//!         println!("app hosts: {value}");
//!     });
//!
//!     let answer = follower.invoke("getHosts", vec![json!("app")]).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod follower;
pub mod protocol;
pub mod transport;
pub mod writer;

pub use connection::{Connection, ConnectionEvent, ConnectionOptions};
pub use error::{ClusterError, Result};
pub use follower::{Follower, FollowerBuilder, FollowerOptions, FollowerState};
