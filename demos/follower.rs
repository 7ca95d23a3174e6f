//! Follower demo - subscribe, invoke and publish against a running leader.
//!
//! This demo shows:
//! - Building a follower with the fluent API
//! - Declaring the `publish` delegate through a descriptor
//! - Receiving pushed values through a subscription listener
//! - Calling a leader method and waiting for its result
//!
//! # Running
//!
//! ```text
//! cargo run --example follower -- 127.0.0.1:7777
//! ```

use std::time::Duration;

use cluster_follower::follower::Descriptor;
use cluster_follower::Follower;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7777".to_string());

    let follower = Follower::builder("registry")
        .response_timeout(Duration::from_secs(3))
        .descriptor("subscribe", Descriptor::Subscribe)
        .descriptor(
            "publish",
            Descriptor::Delegate {
                to: "publish".to_string(),
            },
        )
        .connect_tcp(addr)?;

    follower.subscribe(json!({"dataId": "demo.hosts"}), |value| {
        println!("demo.hosts -> {value}");
    });

    follower.ready().await?;
    println!("registered into channel {}", follower.name());

    follower
        .publish(json!({"dataId": "demo.hosts", "publishData": "10.0.0.1:80"}))
        .await?;

    match follower.invoke("getHosts", vec![json!("demo.hosts")]).await {
        Ok(hosts) => println!("getHosts -> {hosts}"),
        Err(e) => eprintln!("getHosts failed: {e}"),
    }

    tokio::signal::ctrl_c().await?;
    follower.close();
    Ok(())
}
