//! Simple example of using auto-proxy.
//!
//! Fetches free proxies, verifies them for a while, then activates the best
//! one against an in-memory settings store and prints the pool.

use auto_proxy::{AutoProxyConfig, Health, MemoryProxyStore, ProxyManager};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = AutoProxyConfig::builder()
        .probe_url("http://www.baidu.com")
        .probe_timeout(Duration::from_secs(5))
        .build();

    let manager = ProxyManager::new(config, Arc::new(MemoryProxyStore::new()))?;

    println!("Fetching proxies and starting verification...");
    manager.start().await?;

    tokio::time::sleep(Duration::from_secs(30)).await;

    for entry in manager.snapshot() {
        let band = match entry.health() {
            Health::Good => "good",
            Health::Fair => "fair",
            Health::Poor => "poor",
        };
        println!("{:>3} {:<5} {}", entry.score, band, entry.descriptor);
    }

    match manager.activate() {
        Ok(proxy) => println!("System proxy set to {}", proxy),
        Err(e) => println!("Could not set proxy: {}", e),
    }

    manager.shutdown().await?;
    Ok(())
}
