//! Transfer coordinator — owns the UDP socket and the per-destination
//! submission table, and drives page transmission toward each client.
//!
//! One receive loop classifies datagrams by length (see cascade_core::wire)
//! and dispatches. Datasets finish on generator worker threads; the
//! completion callback hands them back here over a channel, and the submit
//! loop encodes, records, and starts the first burst.
//!
//! Every socket write goes through one async gate: the socket is shared by
//! all client sessions and bursts run concurrently.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use cascade_core::paging::{self, PageSet};
use cascade_core::store::Dataset;
use cascade_core::wire::{self, Request};

use crate::generator::Generator;

/// Delay before each page send within a burst.
const PACING: Duration = Duration::from_millis(1);

/// Per-destination session state: the dataset's pages and its manifest,
/// alive from dataset completion until the client's completion ack.
pub struct Submission {
    pages: PageSet,
    /// Encoded manifest, resent verbatim on request.
    manifest: Bytes,
    identifiers: Vec<u64>,
}

impl Submission {
    /// Page indexes whose identifiers appear in the reported set. The
    /// matching direction is deliberate: the pages a client reports
    /// already holding are the ones resent. See DESIGN.md.
    fn matching_indexes(&self, reported: &[u64]) -> Vec<u16> {
        let reported: HashSet<u64> = reported.iter().copied().collect();
        self.identifiers
            .iter()
            .enumerate()
            .filter(|(_, id)| reported.contains(id))
            .map(|(i, _)| i as u16)
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.pages.page_count()
    }
}

pub struct Coordinator {
    socket: Arc<UdpSocket>,
    submissions: DashMap<SocketAddr, Arc<Submission>>,
    send_gate: tokio::sync::Mutex<()>,
    page_size: u16,
    min_seed: f64,
}

impl Coordinator {
    pub fn new(socket: Arc<UdpSocket>, page_size: u16, target: usize) -> Arc<Self> {
        Arc::new(Self {
            socket,
            submissions: DashMap::new(),
            send_gate: tokio::sync::Mutex::new(()),
            page_size,
            min_seed: wire::min_seed(target),
        })
    }

    /// Receive loop: classify and dispatch every incoming datagram.
    /// Socket errors are logged and non-fatal; the loop never stops.
    pub async fn receive_loop(
        self: Arc<Self>,
        generator: Arc<Generator>,
        ready_tx: mpsc::UnboundedSender<(SocketAddr, Dataset)>,
    ) -> Result<()> {
        let mut buf = vec![0u8; wire::MAX_DATAGRAM];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "receive failed");
                    continue;
                }
            };

            match Request::classify(len) {
                Request::Seed => {
                    let seed = f64::from_le_bytes(buf[..8].try_into().unwrap());
                    self.admit(peer, seed, &generator, &ready_tx).await;
                }
                Request::TransferComplete => self.forget(peer),
                Request::MissingIndexes => self.resend_missing(peer, &buf[..len]),
                Request::ReportedIdentifiers => self.resend_reported(peer, &buf[..len]),
            }
        }
    }

    /// Submit loop: receives finished datasets from generator workers,
    /// records the submission, and starts the initial transmission.
    pub async fn submit_loop(
        self: Arc<Self>,
        mut ready_rx: mpsc::UnboundedReceiver<(SocketAddr, Dataset)>,
    ) -> Result<()> {
        while let Some((peer, dataset)) = ready_rx.recv().await {
            let submission = self.install(peer, &dataset);
            tracing::info!(
                %peer,
                pages = submission.page_count(),
                bytes = submission.pages.total_bytes(),
                "submission ready, starting burst"
            );

            let this = self.clone();
            tokio::spawn(async move {
                this.send_datagram(peer, &submission.manifest).await;
                let all: Vec<u16> = (0..submission.page_count() as u16).collect();
                this.burst(peer, submission, all).await;
            });
        }
        tracing::info!("generator channel closed, submit loop exiting");
        Ok(())
    }

    /// Encode a dataset and record its submission for `peer`. A repeated
    /// request replaces the table entry; bursts already in flight keep
    /// their own handle to the old submission.
    fn install(&self, peer: SocketAddr, dataset: &Dataset) -> Arc<Submission> {
        let (pages, manifest) = paging::encode(dataset, self.page_size);
        let submission = Arc::new(Submission {
            identifiers: manifest.identifiers().to_vec(),
            manifest: manifest.encode(),
            pages,
        });
        self.submissions.insert(peer, submission.clone());
        submission
    }

    async fn admit(
        &self,
        peer: SocketAddr,
        seed: f64,
        generator: &Generator,
        ready_tx: &mpsc::UnboundedSender<(SocketAddr, Dataset)>,
    ) {
        if let Some(reason) = self.validate(peer, seed) {
            tracing::warn!(%peer, seed, reason, "request rejected");
            self.send_datagram(peer, &wire::pad_rejection(reason)).await;
            return;
        }

        tracing::info!(%peer, seed, "request admitted");
        let tx = ready_tx.clone();
        // Runs on a generator worker thread; the channel is the only thing
        // it touches.
        generator.add_instance(
            seed,
            Box::new(move |dataset| {
                let _ = tx.send((peer, dataset));
            }),
        );
    }

    /// None if the request is admissible, otherwise the rejection reason.
    pub fn validate(&self, peer: SocketAddr, seed: f64) -> Option<&'static str> {
        let local = match self.socket.local_addr() {
            Ok(addr) => addr,
            Err(_) => return Some("server socket unavailable"),
        };
        if peer.is_ipv6() != local.is_ipv6() {
            return Some("protocol mismatch");
        }
        // Also rejects NaN seeds.
        if !(seed >= self.min_seed) {
            return Some("seed too small");
        }
        None
    }

    fn resend_missing(self: &Arc<Self>, peer: SocketAddr, datagram: &[u8]) {
        let indexes = match wire::decode_missing_indexes(datagram) {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "malformed index list, dropped");
                return;
            }
        };
        let Some(submission) = self.lookup(peer) else {
            return;
        };

        tracing::debug!(%peer, requested = indexes.len(), "resending missing pages");
        let this = self.clone();
        tokio::spawn(async move { this.burst(peer, submission, indexes).await });
    }

    fn resend_reported(self: &Arc<Self>, peer: SocketAddr, datagram: &[u8]) {
        let reported = match wire::decode_reported_identifiers(datagram) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "malformed identifier set, dropped");
                return;
            }
        };
        let Some(submission) = self.lookup(peer) else {
            return;
        };

        let indexes = submission.matching_indexes(&reported);
        tracing::debug!(
            %peer,
            reported = reported.len(),
            resending = indexes.len(),
            "resending manifest and reported pages"
        );
        let this = self.clone();
        tokio::spawn(async move {
            this.send_datagram(peer, &submission.manifest).await;
            this.burst(peer, submission, indexes).await;
        });
    }

    fn forget(&self, peer: SocketAddr) {
        if self.submissions.remove(&peer).is_some() {
            tracing::info!(%peer, "transfer complete, submission removed");
        } else {
            tracing::warn!(%peer, "completion ack for unknown destination");
        }
    }

    fn lookup(&self, peer: SocketAddr) -> Option<Arc<Submission>> {
        match self.submissions.get(&peer) {
            Some(entry) => Some(entry.value().clone()),
            None => {
                tracing::warn!(%peer, "no live submission for retransmit request, dropped");
                None
            }
        }
    }

    /// Send the named pages one at a time, paced, then the burst-complete
    /// marker. Page sends are causally chained: the next send is only
    /// issued after the previous one finishes.
    async fn burst(&self, peer: SocketAddr, submission: Arc<Submission>, indexes: Vec<u16>) {
        for idx in indexes {
            tokio::time::sleep(PACING).await;
            let Some(page) = submission.pages.page(idx as usize) else {
                tracing::warn!(%peer, index = idx, "requested page out of range, skipped");
                continue;
            };
            tracing::trace!(
                %peer,
                index = idx,
                id = hex::encode(&page[..8]),
                "page sent"
            );
            self.send_datagram(peer, &page).await;
        }
        self.send_datagram(peer, &wire::MARKER).await;
    }

    async fn send_datagram(&self, peer: SocketAddr, bytes: &[u8]) {
        let _ordered = self.send_gate.lock().await;
        if let Err(e) = self.socket.send_to(bytes, peer).await {
            tracing::warn!(%peer, error = %e, "send failed");
        }
    }

    /// Number of live submissions.
    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    pub fn has_submission(&self, peer: SocketAddr) -> bool {
        self.submissions.contains_key(&peer)
    }
}
