use crate::*;

use std::collections::HashSet;
use std::time::Duration;

use cascade_core::wire::{self, Reply};
use tokio::net::UdpSocket;

#[tokio::test]
async fn end_to_end_transfer_delivers_unique_dataset() {
    let target = 300;
    let (server, coordinator) = spawn_server(target).await;

    let seed = 1.0;
    let samples = run_client(server, seed, false).await.unwrap();

    assert_eq!(samples.len(), target);
    let bits: HashSet<u64> = samples.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits.len(), target, "samples must be pairwise distinct");
    assert!(samples.iter().all(|v| (-seed..=seed).contains(v)));

    // The completion ack removes the submission server-side.
    for _ in 0..50 {
        if coordinator.submission_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(coordinator.submission_count(), 0);
}

#[tokio::test]
async fn lost_page_is_recovered_via_missing_index_cycle() {
    let target = 300;
    let (server, _coordinator) = spawn_server(target).await;

    // The first page datagram is dropped before the agent sees it; the
    // burst-complete marker then triggers the missing-index exchange.
    let samples = run_client(server, 1.0, true).await.unwrap();

    assert_eq!(samples.len(), target);
    let bits: HashSet<u64> = samples.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits.len(), target);
}

#[tokio::test]
async fn tiny_seed_is_rejected_with_diagnostic_text() {
    let (server, coordinator) = spawn_server(300).await;

    let socket = UdpSocket::bind("[::1]:0").await.unwrap();
    socket
        .send_to(&1e-300_f64.to_le_bytes(), server)
        .await
        .unwrap();

    let mut buf = vec![0u8; wire::MAX_DATAGRAM];
    let (len, _from) = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .expect("no rejection received")
        .unwrap();

    assert_eq!(Reply::classify(len), Reply::Diagnostic);
    let text = String::from_utf8_lossy(&buf[..len]);
    assert!(text.contains("seed"), "unexpected rejection text: {text}");
    assert_eq!(coordinator.submission_count(), 0);
}

#[tokio::test]
async fn retransmit_request_for_unknown_destination_is_dropped() {
    let (server, _coordinator) = spawn_server(300).await;

    let socket = UdpSocket::bind("[::1]:0").await.unwrap();
    let request = wire::encode_missing_indexes(&[0, 1]);
    socket.send_to(&request, server).await.unwrap();

    // No submission exists for this destination, so nothing comes back.
    let mut buf = vec![0u8; 64];
    let response =
        tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(response.is_err(), "server must not answer unknown destinations");
}

#[tokio::test]
async fn two_clients_transfer_concurrently() {
    let target = 200;
    let (server, _coordinator) = spawn_server(target).await;

    let (a, b) = tokio::join!(
        run_client(server, 1.0, false),
        run_client(server, 2.0, true)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len(), target);
    assert_eq!(b.len(), target);
    assert!(b.iter().any(|v| v.abs() > 1.0), "seed 2.0 domain is wider");
}
