//! Page codec — slices a finished dataset into transmittable pages and
//! derives its checksum manifest.
//!
//! A page's identifier is the first 8-byte value it contains. Because every
//! value in a dataset is unique, no two pages of one dataset can share an
//! identifier, so the first value doubles as a collision-free checksum.
//! Identifiers are opaque bit patterns — they are never compared as numbers.

use bytes::Bytes;
use zerocopy::AsBytes;

use crate::wire::WireError;

/// The pages of one dataset: cheap slices of a single shared byte buffer.
#[derive(Debug, Clone)]
pub struct PageSet {
    data: Bytes,
    page_size: usize,
}

impl PageSet {
    pub fn page_count(&self) -> usize {
        self.data.len().div_ceil(self.page_size)
    }

    /// Byte slice of the page at `index`, or None past the end.
    /// The final page may be shorter than the page size.
    pub fn page(&self, index: usize) -> Option<Bytes> {
        let start = index.checked_mul(self.page_size)?;
        if start >= self.data.len() {
            return None;
        }
        let end = (start + self.page_size).min(self.data.len());
        Some(self.data.slice(start..end))
    }

    pub fn iter(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.page_count()).filter_map(|i| self.page(i))
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Checksum manifest: the page size and one identifier per page, in page
/// order. Built once per dataset, retransmitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    page_size: u16,
    identifiers: Vec<u64>,
}

impl Manifest {
    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.identifiers.len()
    }

    pub fn identifiers(&self) -> &[u64] {
        &self.identifiers
    }

    /// Wire form: 2-byte little-endian page size, then 8 bytes per page.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(2 + self.identifiers.len() * 8);
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        for id in &self.identifiers {
            buf.extend_from_slice(&id.to_ne_bytes());
        }
        Bytes::from(buf)
    }

    pub fn decode(datagram: &[u8]) -> Result<Manifest, WireError> {
        if datagram.len() < 2 || (datagram.len() - 2) % 8 != 0 {
            return Err(WireError::BadManifest(datagram.len()));
        }
        let page_size = u16::from_le_bytes([datagram[0], datagram[1]]);
        let identifiers = datagram[2..]
            .chunks_exact(8)
            .map(|c| u64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Manifest {
            page_size,
            identifiers,
        })
    }
}

/// Identifier of a page: its first 8 bytes as an opaque bit pattern.
pub fn page_identifier(page: &[u8]) -> u64 {
    u64::from_ne_bytes(page[..8].try_into().unwrap())
}

/// Split a dataset into pages and derive its manifest. Pure function of the
/// dataset; the byte buffer is copied once, pages alias it.
pub fn encode(dataset: &[f64], page_size: u16) -> (PageSet, Manifest) {
    debug_assert!(page_size as usize % 8 == 0);

    let data = Bytes::copy_from_slice(dataset.as_bytes());
    let pages = PageSet {
        data,
        page_size: page_size as usize,
    };
    let identifiers = pages.iter().map(|p| page_identifier(&p)).collect();
    let manifest = Manifest {
        page_size,
        identifiers,
    };
    (pages, manifest)
}

/// Reinterpret a reassembled byte buffer as samples.
pub fn bytes_to_samples(buffer: &[u8]) -> Vec<f64> {
    buffer
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 + 0.5).collect()
    }

    #[test]
    fn round_trip_reassembles_byte_for_byte() {
        let data = dataset(100);
        let (pages, manifest) = encode(&data, 64);

        let mut reassembled = Vec::new();
        for i in 0..pages.page_count() {
            reassembled.extend_from_slice(&pages.page(i).unwrap());
        }
        assert_eq!(reassembled, data.as_bytes());
        assert_eq!(bytes_to_samples(&reassembled), data);
        assert_eq!(manifest.page_count(), pages.page_count());
    }

    #[test]
    fn manifest_fields_match_pages() {
        let data = dataset(24);
        let (pages, manifest) = encode(&data, 64);

        assert_eq!(manifest.page_size(), 64);
        for (i, id) in manifest.identifiers().iter().enumerate() {
            let page = pages.page(i).unwrap();
            assert_eq!(*id, page_identifier(&page));
        }
    }

    #[test]
    fn exact_multiple_yields_equal_pages() {
        // 24 samples * 8 bytes = 192 = 3 * 64
        let data = dataset(24);
        let (pages, _) = encode(&data, 64);
        assert_eq!(pages.page_count(), 3);
        for i in 0..3 {
            assert_eq!(pages.page(i).unwrap().len(), 64);
        }
        assert!(pages.page(3).is_none());
    }

    #[test]
    fn short_tail_has_remainder_length() {
        // 25 samples * 8 bytes = 200 = 3 * 64 + 8
        let data = dataset(25);
        let (pages, manifest) = encode(&data, 64);
        assert_eq!(pages.page_count(), 4);
        assert_eq!(pages.page(3).unwrap().len(), 200 % 64);
        assert_eq!(manifest.page_count(), 4);
    }

    #[test]
    fn manifest_encoding_is_idempotent() {
        let data = dataset(25);
        let (_, manifest) = encode(&data, 64);
        let first = manifest.encode();
        let second = manifest.encode();
        assert_eq!(first, second);

        let decoded = Manifest::decode(&first).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn manifest_decode_rejects_bad_lengths() {
        assert!(Manifest::decode(&[]).is_err());
        assert!(Manifest::decode(&[0]).is_err());
        assert!(Manifest::decode(&[0; 9]).is_err());
    }

    #[test]
    fn identifiers_distinguish_every_page_of_a_unique_dataset() {
        let data = dataset(1000);
        let (_, manifest) = encode(&data, 64);
        let mut ids: Vec<u64> = manifest.identifiers().to_vec();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), manifest.page_count());
    }
}
