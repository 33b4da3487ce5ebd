//! cascade-core — wire format, page codec, sample store, and configuration.
//! Both cascade binaries depend on this one.

pub mod config;
pub mod paging;
pub mod store;
pub mod wire;

pub use paging::{Manifest, PageSet};
pub use store::{Dataset, UniqueSampleStore};
