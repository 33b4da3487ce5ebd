//! Transfer agent — the client half of the page exchange.
//!
//! The agent is a plain state machine over received datagrams: feed it a
//! datagram, get back the reply to send (if any). It owns no socket, so
//! the whole dispatch table is testable without I/O. The receive loop in
//! main re-arms unconditionally until `is_complete()` — no branch of the
//! dispatch may stall the loop.
//!
//! States: idle → awaiting manifest → receiving → complete.

use std::collections::HashSet;

use cascade_core::paging::{self, Manifest};
use cascade_core::wire::{self, Reply};

pub struct TransferAgent {
    manifest: Option<Manifest>,
    /// Identifiers of pages that have landed, as raw bit patterns.
    received: HashSet<u64>,
    buffer: Vec<u8>,
    /// Full pages written so far; determines the next page's offset.
    full_pages: usize,
    /// The short final page, staged until completion.
    tail: Option<Vec<u8>>,
    complete: bool,
}

impl TransferAgent {
    pub fn new() -> Self {
        Self {
            manifest: None,
            received: HashSet::new(),
            buffer: Vec::new(),
            full_pages: 0,
            tail: None,
            complete: false,
        }
    }

    /// Dispatch one received datagram; returns the reply to send, if any.
    pub fn handle(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        match Reply::classify(datagram.len()) {
            Reply::Ping => self.on_ping(),
            Reply::Manifest => self.on_manifest(datagram),
            Reply::Page => self.on_page(datagram),
            Reply::Diagnostic => {
                tracing::warn!(
                    text = %String::from_utf8_lossy(datagram),
                    "server diagnostic"
                );
                None
            }
        }
    }

    /// The transfer is done and the buffer holds the complete dataset.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// Hand out the reassembled samples. Only meaningful once complete.
    pub fn into_samples(self) -> Vec<f64> {
        paging::bytes_to_samples(&self.buffer)
    }

    fn on_ping(&mut self) -> Option<Vec<u8>> {
        let Some(manifest) = &self.manifest else {
            // No manifest yet: report which identifiers we do hold (possibly
            // none) so the server resends its manifest.
            let held: Vec<u64> = self.received.iter().copied().collect();
            return Some(wire::encode_reported_identifiers(&held));
        };

        if self.received.len() == manifest.page_count() {
            self.finish();
            return Some(wire::MARKER.to_vec());
        }

        let missing: Vec<u16> = manifest
            .identifiers()
            .iter()
            .enumerate()
            .filter(|(_, id)| !self.received.contains(id))
            .map(|(i, _)| i as u16)
            .collect();
        tracing::debug!(missing = missing.len(), "requesting missing pages");
        Some(wire::encode_missing_indexes(&missing))
    }

    fn on_manifest(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        let manifest = match Manifest::decode(datagram) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable manifest, dropped");
                return None;
            }
        };
        if manifest.page_size() == 0 || manifest.page_size() % 8 != 0 {
            tracing::warn!(page_size = manifest.page_size(), "implausible page size, dropped");
            return None;
        }

        tracing::info!(
            pages = manifest.page_count(),
            page_size = manifest.page_size(),
            "manifest received"
        );

        let page_count = manifest.page_count();
        let total = page_count * manifest.page_size() as usize;
        if self.buffer.len() < total {
            self.buffer.resize(total, 0);
        }
        self.manifest = Some(manifest);

        if self.received.len() == page_count {
            self.finish();
            return Some(wire::MARKER.to_vec());
        }
        None
    }

    fn on_page(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        let id = paging::page_identifier(datagram);
        if self.received.contains(&id) {
            tracing::trace!(id = hex::encode(&datagram[..8]), "duplicate page, ignored");
            return None;
        }

        match self.manifest.as_ref().map(|m| m.page_size() as usize) {
            Some(page_size) if datagram.len() > page_size => {
                tracing::warn!(len = datagram.len(), "oversized page, dropped");
                return None;
            }
            Some(page_size) if datagram.len() < page_size => {
                // Only the dataset's final page can be short; stage it and
                // append after the full pages at completion.
                self.tail = Some(datagram.to_vec());
            }
            Some(page_size) => {
                let offset = self.full_pages * page_size;
                if self.buffer.len() < offset + datagram.len() {
                    self.buffer.resize(offset + datagram.len(), 0);
                }
                self.buffer[offset..offset + datagram.len()].copy_from_slice(datagram);
                self.full_pages += 1;
            }
            None => {
                // Manifest not seen yet: land pages in arrival order.
                self.buffer.extend_from_slice(datagram);
                self.full_pages += 1;
            }
        }
        self.received.insert(id);

        if let Some(manifest) = &self.manifest {
            if self.received.len() == manifest.page_count() {
                self.finish();
                return Some(wire::MARKER.to_vec());
            }
        }
        None
    }

    fn finish(&mut self) {
        if self.complete {
            return;
        }
        let Some(manifest) = &self.manifest else {
            return;
        };

        // Trim the zero-filled slack, then attach the short tail (if the
        // dataset's byte length was not an exact page multiple).
        self.buffer
            .truncate(self.full_pages * manifest.page_size() as usize);
        if let Some(tail) = self.tail.take() {
            self.buffer.extend_from_slice(&tail);
        }
        self.complete = true;

        tracing::info!(
            pages = manifest.page_count(),
            bytes = self.buffer.len(),
            "transfer complete"
        );
    }
}

impl Default for TransferAgent {
    fn default() -> Self {
        Self::new()
    }
}
