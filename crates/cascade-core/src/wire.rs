//! cascade wire format — datagram classification and list codecs.
//!
//! There is no opcode byte. Every datagram is classified purely by its
//! length, so every length class below IS the protocol. The padding rules
//! exist to keep the classes disjoint: index lists are always odd-length,
//! identifier sets always even-length, and rejection text is padded so it
//! can never be mistaken for either a completion marker or page data.

use static_assertions::const_assert;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Bytes per page. The final page of a dataset may be shorter.
pub const PAGE_SIZE: u16 = 64_000;

/// Number of unique samples generated per client request.
pub const TARGET_CARDINALITY: usize = 1_000_000;

/// Largest UDP payload either side will send or receive.
pub const MAX_DATAGRAM: usize = 65_515;

/// Single-byte marker. From the server it means "burst complete" (a ping
/// inviting the client to report); from the client it means "all data
/// received, drop my submission".
pub const MARKER: [u8; 1] = [0];

// Pages carry whole f64 values; a page that split a sample would break
// identifier extraction on the client.
const_assert!(PAGE_SIZE as usize % 8 == 0);
const_assert!(PAGE_SIZE as usize <= MAX_DATAGRAM);

/// Smallest accepted seed for a given target cardinality. The sampling
/// domain [-seed, seed] must contain at least target/2 epsilons on each
/// side, or the generator could never reach the target cardinality.
pub fn min_seed(target: usize) -> f64 {
    f64::EPSILON * (target as f64 / 2.0).ceil()
}

// ── Length classification ─────────────────────────────────────────────────────

/// What the server makes of an incoming datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// 8 bytes: a new transfer request carrying the seed.
    Seed,
    /// 1 byte: the client has everything; forget its submission.
    TransferComplete,
    /// Odd length > 1: little-endian u16 page indexes + 1 padding byte.
    MissingIndexes,
    /// Even length: 8-byte page identifiers + 2 padding bytes.
    ReportedIdentifiers,
}

impl Request {
    pub fn classify(len: usize) -> Request {
        if len == 8 {
            Request::Seed
        } else if len == 1 {
            Request::TransferComplete
        } else if len % 2 == 1 {
            Request::MissingIndexes
        } else {
            Request::ReportedIdentifiers
        }
    }
}

/// What the client makes of an incoming datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 1 byte: burst complete — report state back to the server.
    Ping,
    /// 2 + 8n bytes: page size + per-page identifiers.
    Manifest,
    /// 8n bytes (n > 0), not manifest-shaped: page data.
    Page,
    /// Anything else: free-form diagnostic text. Log it, no protocol action.
    Diagnostic,
}

impl Reply {
    pub fn classify(len: usize) -> Reply {
        if len == 1 {
            Reply::Ping
        } else if len >= 2 && (len - 2) % 8 == 0 {
            Reply::Manifest
        } else if len > 0 && len % 8 == 0 {
            Reply::Page
        } else {
            Reply::Diagnostic
        }
    }
}

// ── List codecs ───────────────────────────────────────────────────────────────

/// Encode a missing-page index list: little-endian u16s plus one padding
/// byte, which keeps the datagram length odd.
pub fn encode_missing_indexes(indexes: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(indexes.len() * 2 + 1);
    for idx in indexes {
        buf.extend_from_slice(&idx.to_le_bytes());
    }
    buf.push(0);
    buf
}

pub fn decode_missing_indexes(datagram: &[u8]) -> Result<Vec<u16>, WireError> {
    if datagram.is_empty() || datagram.len() % 2 == 0 {
        return Err(WireError::BadIndexList(datagram.len()));
    }
    Ok(datagram[..datagram.len() - 1]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Encode a received-identifier set: raw 8-byte identifiers plus two
/// padding bytes, which keeps the datagram length even and never 8.
pub fn encode_reported_identifiers(identifiers: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(identifiers.len() * 8 + 2);
    for id in identifiers {
        buf.extend_from_slice(&id.to_ne_bytes());
    }
    buf.extend_from_slice(&[0, 0]);
    buf
}

pub fn decode_reported_identifiers(datagram: &[u8]) -> Result<Vec<u64>, WireError> {
    if datagram.len() < 2 || (datagram.len() - 2) % 8 != 0 {
        return Err(WireError::BadIdentifierSet(datagram.len()));
    }
    Ok(datagram[..datagram.len() - 2]
        .chunks_exact(8)
        .map(|c| u64::from_ne_bytes(c.try_into().unwrap()))
        .collect())
}

/// Pad rejection text so its length is odd (and therefore neither a marker
/// nor page-shaped): the client's dispatcher then routes it to the
/// diagnostic path instead of misreading it as protocol data.
pub fn pad_rejection(text: &str) -> Vec<u8> {
    debug_assert!(text.len() > 1, "rejection text must not collide with the marker");
    let mut buf = text.as_bytes().to_vec();
    if buf.len() % 2 == 0 {
        buf.push(b' ');
    }
    buf
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("index list has invalid length {0}")]
    BadIndexList(usize),

    #[error("identifier set has invalid length {0}")]
    BadIdentifierSet(usize),

    #[error("manifest has invalid length {0}")]
    BadManifest(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
