//! cascade integration test harness.
//!
//! Tests here run real transfers over loopback UDP: a coordinator with its
//! generator pool on one socket, a driven transfer agent on another. Page
//! size and target cardinality are scaled down so a full exchange takes
//! milliseconds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use cascade_client::agent::TransferAgent;
use cascade_core::wire::{self, Reply};
use cascaded::coordinator::Coordinator;
use cascaded::generator::Generator;

mod transfer;

/// Small pages so a few hundred samples span many of them.
pub const TEST_PAGE_SIZE: u16 = 64;

/// How long to wait for any single datagram before declaring a stall.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind a coordinator + generator pair on an ephemeral loopback port.
pub async fn spawn_server(target: usize) -> (SocketAddr, Arc<Coordinator>) {
    let socket = Arc::new(UdpSocket::bind("[::1]:0").await.unwrap());
    let addr = socket.local_addr().unwrap();

    let coordinator = Coordinator::new(socket, TEST_PAGE_SIZE, target);
    let generator = Arc::new(Generator::new(2, target, 16));

    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    tokio::spawn(coordinator.clone().receive_loop(generator, ready_tx));
    tokio::spawn(coordinator.clone().submit_loop(ready_rx));

    (addr, coordinator)
}

/// Drive a transfer agent against a live server until completion.
/// With `drop_first_page`, the first page datagram is discarded before the
/// agent sees it, simulating loss on the wire.
pub async fn run_client(
    server: SocketAddr,
    seed: f64,
    drop_first_page: bool,
) -> Result<Vec<f64>> {
    let socket = UdpSocket::bind("[::1]:0").await?;
    socket.send_to(&seed.to_le_bytes(), server).await?;

    let mut agent = TransferAgent::new();
    let mut buf = vec![0u8; wire::MAX_DATAGRAM];
    let mut dropped = false;

    while !agent.is_complete() {
        let (len, _from) = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
            .await
            .context("transfer stalled")??;

        if drop_first_page && !dropped && Reply::classify(len) == Reply::Page {
            dropped = true;
            continue;
        }

        if let Some(reply) = agent.handle(&buf[..len]) {
            socket.send_to(&reply, server).await?;
        }
    }

    Ok(agent.into_samples())
}
