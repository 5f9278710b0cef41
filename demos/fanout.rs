//! Fan a few subjects out to fast, slow and streaming subscribers, then shut
//! the bus down gracefully.
//!
//! Run with `RUST_LOG=subpub=debug cargo run --example fanout [config.json]`.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use subpub::{Bus, BusConfig, Message};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BusConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => BusConfig::default(),
    };
    let bus = Bus::with_config(config)?;

    bus.subscribe_typed("orders", |order: Arc<String>| async move {
        info!(%order, "fast handler");
    })
    .await?;

    bus.subscribe_fn("orders", |message: Message| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!(message_id = %message.id(), "slow handler");
    })
    .await?;

    let mut audit = bus.subscribe_stream("audit", 16).await?;
    let auditor = tokio::spawn(async move {
        let mut seen = 0;
        while let Some(message) = audit.next().await {
            seen += 1;
            info!(subject = message.subject(), seen, "audit entry");
        }
        seen
    });

    for i in 0..10 {
        bus.publish("orders", format!("order-{}", i)).await?;
        bus.publish("audit", i).await?;
    }
    info!("{}", bus.stats().await);

    bus.shutdown().await?;
    let audited = auditor.await?;
    info!(audited, "bus shut down");
    Ok(())
}
