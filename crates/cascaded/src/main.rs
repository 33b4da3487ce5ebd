//! cascaded — cascade dataset server daemon.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use cascade_core::config::ServerConfig;
use cascade_core::wire;

use cascaded::coordinator::Coordinator;
use cascaded::generator::Generator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cascaded.json".to_string());
    let config = ServerConfig::load(Path::new(&config_path))
        .with_context(|| format!("failed to load server config {config_path}"))?;

    let workers = if config.generator.workers > 0 {
        config.generator.workers
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    };
    tracing::info!(port = config.port, workers, "cascaded starting");

    let generator = Arc::new(Generator::new(
        workers,
        wire::TARGET_CARDINALITY,
        config.generator.batch_size,
    ));

    let socket = Arc::new(
        UdpSocket::bind(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, config.port, 0, 0))
            .await
            .context("failed to bind listen socket")?,
    );
    tracing::info!(addr = %socket.local_addr()?, "listening");

    let coordinator = Coordinator::new(socket, wire::PAGE_SIZE, wire::TARGET_CARDINALITY);

    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    let receive_task = tokio::spawn(coordinator.clone().receive_loop(generator.clone(), ready_tx));
    let submit_task = tokio::spawn(coordinator.submit_loop(ready_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        r = receive_task => tracing::error!("receive loop exited: {:?}", r),
        r = submit_task  => tracing::error!("submit loop exited: {:?}", r),
    }

    Ok(())
}
