//! cascade-client — requests a dataset, reassembles it from pages, and
//! persists the sorted result.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use cascade_core::config::{self, ClientConfig};
use cascade_core::wire;

use cascade_client::agent::TransferAgent;
use cascade_client::writer::ResultWriter;

/// Grace period before the seed is sent, giving the server time to come up
/// when both sides start together.
const INITIAL_DELAY: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "example.json".to_string()),
    );
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("failed to load client config {}", config_path.display()))?;
    let output = config::output_path(&config_path);

    let server: SocketAddr = tokio::net::lookup_host((config.address.as_str(), config.port))
        .await
        .context("failed to resolve server address")?
        .next()
        .context("server address resolved to nothing")?;

    let socket = UdpSocket::bind(if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" })
        .await
        .context("failed to bind socket")?;

    let writer = ResultWriter::spawn(output);

    tracing::info!(%server, seed = config.seed, "requesting dataset");
    tokio::time::sleep(INITIAL_DELAY).await;
    socket
        .send_to(&config.seed.to_le_bytes(), server)
        .await
        .context("failed to send seed")?;

    // A receive is always pending until the transfer completes; no reply
    // branch may stall the loop.
    let mut agent = TransferAgent::new();
    let mut buf = vec![0u8; wire::MAX_DATAGRAM];
    while !agent.is_complete() {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "receive failed");
                continue;
            }
        };
        if from != server {
            tracing::trace!(%from, "datagram from unexpected peer, ignored");
            continue;
        }
        if let Some(reply) = agent.handle(&buf[..len]) {
            if let Err(e) = socket.send_to(&reply, server).await {
                tracing::warn!(error = %e, "send failed");
            }
        }
    }

    writer.submit(agent.into_samples());
    writer.finish();
    Ok(())
}
